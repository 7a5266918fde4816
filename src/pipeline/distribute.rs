use crate::bio::BioSequence;
use crate::pipeline::{spawn_closer, BatchBuilder, BioSequenceIter};
use crossbeam::channel::{unbounded, Receiver};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::Hasher;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Assigns an integer class to each record.
///
/// Codes are stable for the lifetime of a classifier: two records with the
/// same class always get the same code, and `value(code)` gives back a
/// printable form of the class.
pub trait SequenceClassifier: Send {
    fn code(&mut self, record: &BioSequence) -> usize;
    fn value(&self, code: usize) -> String;
    /// Forgets every class seen so far.
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn SequenceClassifier>;
}

impl Clone for Box<dyn SequenceClassifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Interns strings into dense codes.
#[derive(Debug, Clone, Default)]
struct Interner {
    values: IndexMap<String, ()>,
}

impl Interner {
    fn code(&mut self, value: &str) -> usize {
        match self.values.get_index_of(value) {
            Some(i) => i,
            None => self.values.insert_full(value.to_string(), ()).0,
        }
    }

    fn value(&self, code: usize) -> String {
        self.values
            .get_index(code)
            .map(|(k, _)| k.clone())
            .unwrap_or_default()
    }
}

/// Classifies records by the string value of one annotation.
#[derive(Debug, Clone)]
pub struct AnnotationClassifier {
    key: String,
    na: String,
    interner: Interner,
}

impl AnnotationClassifier {
    pub fn new(key: impl Into<String>, na: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            na: na.into(),
            interner: Interner::default(),
        }
    }
}

impl SequenceClassifier for AnnotationClassifier {
    fn code(&mut self, record: &BioSequence) -> usize {
        let value = record
            .get_string_attribute(&self.key)
            .unwrap_or_else(|| self.na.clone());
        self.interner.code(&value)
    }

    fn value(&self, code: usize) -> String {
        self.interner.value(code)
    }

    fn reset(&mut self) {
        self.interner = Interner::default();
    }

    fn clone_box(&self) -> Box<dyn SequenceClassifier> {
        Box::new(self.clone())
    }
}

/// Spreads records over `size` buckets by a hash of their residues, so that
/// identical sequences share a bucket.
#[derive(Debug, Clone)]
pub struct HashClassifier {
    size: usize,
}

impl HashClassifier {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl SequenceClassifier for HashClassifier {
    fn code(&mut self, record: &BioSequence) -> usize {
        let mut hasher = FxHasher::default();
        hasher.write(record.sequence());
        (hasher.finish() % self.size as u64) as usize
    }

    fn value(&self, code: usize) -> String {
        code.to_string()
    }

    fn reset(&mut self) {}

    fn clone_box(&self) -> Box<dyn SequenceClassifier> {
        Box::new(self.clone())
    }
}

/// Classifies records by their residue string.
#[derive(Debug, Clone, Default)]
pub struct ResidueClassifier {
    interner: Interner,
}

impl ResidueClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceClassifier for ResidueClassifier {
    fn code(&mut self, record: &BioSequence) -> usize {
        self.interner.code(&record.string())
    }

    fn value(&self, code: usize) -> String {
        self.interner.value(code)
    }

    fn reset(&mut self) {
        self.interner = Interner::default();
    }

    fn clone_box(&self) -> Box<dyn SequenceClassifier> {
        Box::new(self.clone())
    }
}

/// Product of two classifiers: records share a class iff they share it
/// under both.
#[derive(Clone)]
pub struct CompositeClassifier {
    first: Box<dyn SequenceClassifier>,
    second: Box<dyn SequenceClassifier>,
    pairs: IndexMap<(usize, usize), ()>,
}

impl CompositeClassifier {
    pub fn new(first: Box<dyn SequenceClassifier>, second: Box<dyn SequenceClassifier>) -> Self {
        Self {
            first,
            second,
            pairs: IndexMap::new(),
        }
    }

    /// Folds a list of classifiers into nested composites.
    pub fn chain(
        classifiers: Vec<Box<dyn SequenceClassifier>>,
    ) -> Option<Box<dyn SequenceClassifier>> {
        classifiers
            .into_iter()
            .reduce(|acc, next| Box::new(CompositeClassifier::new(acc, next)))
    }
}

impl SequenceClassifier for CompositeClassifier {
    fn code(&mut self, record: &BioSequence) -> usize {
        let key = (self.first.code(record), self.second.code(record));
        match self.pairs.get_index_of(&key) {
            Some(i) => i,
            None => self.pairs.insert_full(key, ()).0,
        }
    }

    fn value(&self, code: usize) -> String {
        match self.pairs.get_index(code) {
            Some(((a, b), _)) => format!("{}:{}", self.first.value(*a), self.second.value(*b)),
            None => String::new(),
        }
    }

    fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
        self.pairs.clear();
    }

    fn clone_box(&self) -> Box<dyn SequenceClassifier> {
        Box::new(self.clone())
    }
}

/// Fan-out of a stream into one output stream per class.
///
/// Each new class code is announced once on [`news`](Self::news) before the
/// first batch of that class is pushed. Every announced output has to be
/// drained, typically by a thread spawned per announcement, or the
/// distributor blocks on its full channel.
pub struct IDistribute {
    outputs: Arc<Mutex<FxHashMap<usize, BioSequenceIter>>>,
    news: Receiver<usize>,
    classifier: Arc<Mutex<Box<dyn SequenceClassifier>>>,
}

impl IDistribute {
    /// Handle on the output stream of class `code`.
    pub fn outputs(&self, code: usize) -> Option<BioSequenceIter> {
        self.outputs.lock().get(&code).map(BioSequenceIter::split)
    }

    pub fn news(&self) -> &Receiver<usize> {
        &self.news
    }

    /// Printable class of `code`.
    pub fn value(&self, code: usize) -> String {
        self.classifier.lock().value(code)
    }
}

impl BioSequenceIter {
    /// Dispatches records into per-class output streams.
    ///
    /// Input is sorted first so that every output keeps the input order of
    /// its records. Outputs are cut into batches of the input batch size and
    /// numbered from 0.
    pub fn distribute(self, classifier: Box<dyn SequenceClassifier>) -> IDistribute {
        let paired = self.is_paired();
        let batch_size = self.batch_size();
        let sorted = self.sort_batches();
        let template = sorted.sibling_stream();

        let outputs: Arc<Mutex<FxHashMap<usize, BioSequenceIter>>> = Arc::default();
        let classifier = Arc::new(Mutex::new(classifier));
        let (announce, news) = unbounded();

        let shared_outputs = Arc::clone(&outputs);
        let shared_classifier = Arc::clone(&classifier);
        thread::spawn(move || {
            let mut builders: FxHashMap<usize, (BatchBuilder, BioSequenceIter)> =
                FxHashMap::default();
            for batch in sorted {
                let source = batch.source;
                let mut mates = batch.mates.map(Vec::into_iter);
                for record in batch.slice {
                    let mate = mates.as_mut().and_then(Iterator::next);
                    let code = shared_classifier.lock().code(&record);
                    let (builder, out) = builders.entry(code).or_insert_with(|| {
                        let out = template.sibling_stream();
                        if paired {
                            out.mark_as_paired();
                        }
                        out.add(1);
                        spawn_closer(&out);
                        shared_outputs.lock().insert(code, out.split());
                        debug!("new distribution class {}", code);
                        if announce.send(code).is_err() {
                            debug!("nobody listens to distribution news");
                        }
                        (BatchBuilder::new(batch_size, paired), out)
                    });
                    if let Some(b) = builder.push(&source, record, mate) {
                        out.push(b);
                    }
                }
            }
            for (_, (mut builder, out)) in builders {
                if let Some(b) = builder.flush() {
                    out.push(b);
                }
                out.done();
            }
        });

        IDistribute {
            outputs,
            news,
            classifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::BioSequenceBatch;

    #[test]
    fn test_annotation_classifier_codes() {
        let mut c = AnnotationClassifier::new("tag", "NA");
        let mut a = BioSequence::new("a", "ac", "");
        a.set_attribute("tag", "x");
        let b = BioSequence::new("b", "ac", "");
        assert_eq!(c.code(&a), 0);
        assert_eq!(c.code(&b), 1);
        assert_eq!(c.code(&a), 0);
        assert_eq!(c.value(1), "NA");
        c.reset();
        assert_eq!(c.code(&b), 0);
    }

    #[test]
    fn test_hash_classifier_groups_identical_sequences() {
        let mut c = HashClassifier::new(16);
        let a = BioSequence::new("a", "acgtacgt", "");
        let b = BioSequence::new("b", "ACGTACGT", "");
        assert_eq!(c.code(&a), c.code(&b));
        assert!(c.code(&a) < 16);
    }

    #[test]
    fn test_composite_classifier() {
        let mut c = CompositeClassifier::new(
            Box::new(ResidueClassifier::new()),
            Box::new(AnnotationClassifier::new("sample", "NA")),
        );
        let mut a = BioSequence::new("a", "acgt", "");
        a.set_attribute("sample", "s1");
        let mut b = a.clone();
        b.set_attribute("sample", "s2");
        let ca = c.code(&a);
        let cb = c.code(&b);
        assert_ne!(ca, cb);
        assert_eq!(c.code(&a.clone()), ca);
        assert_eq!(c.value(cb), "acgt:s2");
    }

    #[test]
    fn test_distribute_announces_each_class_once() {
        let records: Vec<BioSequence> = (0..10)
            .map(|i| {
                let mut s = BioSequence::new(format!("s{}", i), "acgt", "");
                s.set_attribute("tag", if i % 3 == 0 { "x" } else { "y" });
                s
            })
            .collect();
        let dist = BioSequenceIter::from_records(records, 2, "m")
            .distribute(Box::new(AnnotationClassifier::new("tag", "NA")));

        let mut handles = Vec::new();
        let mut announced = Vec::new();
        for code in dist.news().iter() {
            announced.push(dist.value(code));
            let out = dist.outputs(code).unwrap();
            handles.push(thread::spawn(move || {
                let batches: Vec<BioSequenceBatch> = out.collect();
                batches
            }));
        }
        assert_eq!(announced, vec!["x".to_string(), "y".to_string()]);
        let results: Vec<Vec<BioSequenceBatch>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let x_ids: Vec<String> = results[0]
            .iter()
            .flat_map(|b| b.slice.iter().map(|s| s.id().to_string()))
            .collect();
        assert_eq!(x_ids, vec!["s0", "s3", "s6", "s9"]);
        assert_eq!(results[1].iter().map(|b| b.order).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
