use crate::bio::{BioSequence, BioSequenceBatch};
use crate::pipeline::distribute::{
    AnnotationClassifier, CompositeClassifier, HashClassifier, ResidueClassifier,
    SequenceClassifier,
};
use crate::pipeline::{spawn_closer, BioSequenceIter};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Number of hash buckets the input is spread over before grouping.
const UNIQUE_BUCKETS: usize = 64;

/// Options of [`dereplicate`].
#[derive(Debug, Clone)]
pub struct UniqueOptions {
    /// Annotations that must be equal for two records to merge.
    pub categories: Vec<String>,
    /// Annotations summarized into `merged_<key>` histograms.
    pub stats_on: Vec<String>,
    pub na: String,
    pub buckets: usize,
}

impl Default for UniqueOptions {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            stats_on: Vec::new(),
            na: "NA".to_string(),
            buckets: UNIQUE_BUCKETS,
        }
    }
}

/// Builds the grouping classifier: residues, then each category in turn.
fn group_classifier(categories: &[String], na: &str) -> Box<dyn SequenceClassifier> {
    let mut chain: Vec<Box<dyn SequenceClassifier>> = vec![Box::new(ResidueClassifier::new())];
    for key in categories {
        chain.push(Box::new(AnnotationClassifier::new(key.clone(), na)));
    }
    match CompositeClassifier::chain(chain) {
        Some(c) => c,
        None => Box::new(ResidueClassifier::new()),
    }
}

/// Collapses records with identical residues (and identical category
/// values) into one record whose `count` is the sum of the group's counts.
///
/// Mates are dropped. Output batches are numbered from 0 but the grouping
/// order of records is not the input order.
pub fn dereplicate(input: BioSequenceIter, options: &UniqueOptions) -> BioSequenceIter {
    let batch_size = input.batch_size();
    let dist = input.distribute(Box::new(HashClassifier::new(options.buckets)));

    let merged = BioSequenceIter::new();
    merged.set_batch_size(batch_size);
    let counter = Arc::new(AtomicUsize::new(0));
    // held until every announced bucket has its handler
    merged.add(1);
    spawn_closer(&merged);

    let producer = merged.split();
    let options = options.clone();
    thread::spawn(move || {
        for code in dist.news().iter() {
            let Some(bucket) = dist.outputs(code) else {
                continue;
            };
            producer.add(1);
            let out = producer.split();
            let counter = Arc::clone(&counter);
            let options = options.clone();
            thread::spawn(move || {
                let mut classifier = group_classifier(&options.categories, &options.na);
                let mut groups: IndexMap<usize, BioSequence> = IndexMap::new();
                for batch in bucket {
                    let (batch, _) = batch.unpair();
                    for record in batch.slice {
                        let class = classifier.code(&record);
                        match groups.get_mut(&class) {
                            Some(group) => group.merge(&record, &options.na, &options.stats_on),
                            None => {
                                let mut first = record;
                                for key in &options.stats_on {
                                    first.stats_on(key, &options.na);
                                }
                                groups.insert(class, first);
                            }
                        }
                    }
                }
                debug!("bucket {} collapsed into {} records", code, groups.len());
                let records: Vec<BioSequence> = groups.into_values().collect();
                for chunk in records.chunks(batch_size.max(1)) {
                    let order = counter.fetch_add(1, Ordering::SeqCst);
                    out.push(BioSequenceBatch::new("unique", order, chunk.to_vec()));
                }
                out.done();
            });
        }
        producer.done();
    });

    merged.rebatch(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, seq: &str, sample: &str) -> BioSequence {
        let mut s = BioSequence::new(id, seq, "");
        s.set_attribute("sample", sample);
        s
    }

    #[test]
    fn test_dereplicate_counts_identical_sequences() {
        let records = vec![
            record("a", "acgt", "s1"),
            record("b", "acgt", "s2"),
            record("c", "ttgg", "s1"),
            record("d", "ACGT", "s1"),
        ];
        let options = UniqueOptions {
            stats_on: vec!["sample".to_string()],
            ..Default::default()
        };
        let mut out = dereplicate(BioSequenceIter::from_records(records, 2, "m"), &options).load();
        out.sort_by(|a, b| a.sequence().cmp(b.sequence()));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sequence(), b"acgt");
        assert_eq!(out[0].count(), 3);
        let stats = out[0].get_int_map_attribute("merged_sample").unwrap();
        assert_eq!(stats.get("s1"), Some(&2));
        assert_eq!(stats.get("s2"), Some(&1));
        assert!(!out[0].has_attribute("sample"));
        assert_eq!(out[1].count(), 1);
    }

    #[test]
    fn test_dereplicate_respects_categories() {
        let records = vec![
            record("a", "acgt", "s1"),
            record("b", "acgt", "s2"),
            record("c", "acgt", "s1"),
        ];
        let options = UniqueOptions {
            categories: vec!["sample".to_string()],
            ..Default::default()
        };
        let mut out = dereplicate(BioSequenceIter::from_records(records, 10, "m"), &options).load();
        out.sort_by_key(|s| s.count());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].count(), 1);
        assert_eq!(out[1].count(), 2);
        assert_eq!(out[1].get_string_attribute("sample").as_deref(), Some("s1"));
    }
}
