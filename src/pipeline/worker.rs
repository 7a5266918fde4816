use crate::bio::{BioSequence, BioSequenceBatch};
use crate::pipeline::{fatal, spawn_closer, BatchBuilder, BioSequenceIter};
use crate::Result;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Applies `f` to each record of `batch`. Each record can yield zero, one or
/// several records; the mate of a paired record is dropped, kept or cloned
/// accordingly.
fn apply_to_batch<F>(batch: BioSequenceBatch, f: &F, break_on_error: bool) -> BioSequenceBatch
where
    F: Fn(BioSequence) -> Result<Vec<BioSequence>>,
{
    let BioSequenceBatch {
        source,
        order,
        slice,
        mates,
    } = batch;
    let paired = mates.is_some();
    let mut mates = mates.map(Vec::into_iter);
    let mut out = Vec::with_capacity(slice.len());
    let mut out_mates = Vec::new();

    for record in slice {
        let mate = mates.as_mut().and_then(Iterator::next);
        let id = record.id().to_string();
        let produced = match f(record) {
            Ok(produced) => produced,
            Err(err) => {
                if break_on_error {
                    fatal(format!("error on record {}: {}", id, err));
                }
                warn!("record {} dropped: {}", id, err);
                Vec::new()
            }
        };
        if let Some(mate) = mate {
            match produced.len() {
                0 => {}
                1 => out_mates.push(mate),
                n => out_mates.extend(std::iter::repeat(mate).take(n)),
            }
        }
        out.extend(produced);
    }

    if paired {
        match BioSequenceBatch::paired(source, order, out, out_mates) {
            Ok(batch) => batch,
            Err(err) => fatal(err),
        }
    } else {
        BioSequenceBatch::new(source, order, out)
    }
}

impl BioSequenceIter {
    /// Runs `f` over every record on `nworkers` sibling threads.
    ///
    /// Output batches keep the `order` and `source` of their input batch.
    /// A failing record aborts the process when `break_on_error` is set and
    /// is logged and dropped otherwise.
    pub fn make_worker<F>(self, f: F, break_on_error: bool, nworkers: usize) -> BioSequenceIter
    where
        F: Fn(BioSequence) -> Result<Vec<BioSequence>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.make_slice_worker(
            move |batch| Ok(apply_to_batch(batch, f.as_ref(), break_on_error)),
            break_on_error,
            nworkers,
        )
    }

    /// Batch-granular variant of [`make_worker`](Self::make_worker).
    pub fn make_slice_worker<F>(
        self,
        f: F,
        break_on_error: bool,
        nworkers: usize,
    ) -> BioSequenceIter
    where
        F: Fn(BioSequenceBatch) -> Result<BioSequenceBatch> + Send + Sync + 'static,
    {
        let nworkers = nworkers.max(1);
        let out = self.sibling_stream();
        if self.is_paired() {
            out.mark_as_paired();
        }
        let f = Arc::new(f);
        out.add(nworkers);
        for w in 0..nworkers {
            let input = self.split();
            let producer = out.split();
            let f = Arc::clone(&f);
            thread::spawn(move || {
                debug!("worker {} started", w);
                for batch in input {
                    let source = batch.source.clone();
                    let order = batch.order;
                    match f(batch) {
                        Ok(mut result) => {
                            result.order = order;
                            result.source = source;
                            producer.push(result);
                        }
                        Err(err) if break_on_error => {
                            fatal(format!("error on batch {} of {}: {}", order, source, err))
                        }
                        Err(err) => {
                            warn!("batch {} of {} dropped: {}", order, source, err);
                            producer.push(BioSequenceBatch::new(source, order, Vec::new()));
                        }
                    }
                }
                producer.done();
                debug!("worker {} done", w);
            });
        }
        spawn_closer(&out);
        out
    }

    /// Keeps the records for which `predicate` holds.
    pub fn filter<P>(self, predicate: P, nworkers: usize) -> BioSequenceIter
    where
        P: Fn(&BioSequence) -> bool + Send + Sync + 'static,
    {
        self.make_worker(
            move |s| Ok(if predicate(&s) { vec![s] } else { Vec::new() }),
            false,
            nworkers,
        )
    }

    /// Drops records without residues.
    pub fn filter_empty(self, nworkers: usize) -> BioSequenceIter {
        self.filter(|s| !s.is_empty(), nworkers)
    }

    /// Routes records to two streams, the first receiving the records for
    /// which `predicate` holds. Each side is rebatched to `size` records with
    /// its own order numbering.
    ///
    /// Both returned streams must be drained concurrently.
    pub fn divide_on<P>(self, predicate: P, size: usize) -> (BioSequenceIter, BioSequenceIter)
    where
        P: Fn(&BioSequence) -> bool + Send + 'static,
    {
        let paired = self.is_paired();
        let sorted = self.sort_batches();
        let accepted = sorted.sibling_stream();
        let rejected = sorted.sibling_stream();
        for side in [&accepted, &rejected] {
            side.set_batch_size(size);
            if paired {
                side.mark_as_paired();
            }
            side.add(1);
        }
        let (yes, no) = (accepted.split(), rejected.split());
        thread::spawn(move || {
            let mut true_side = BatchBuilder::new(size, paired);
            let mut false_side = BatchBuilder::new(size, paired);
            for batch in sorted {
                let source = batch.source;
                let mut mates = batch.mates.map(Vec::into_iter);
                for record in batch.slice {
                    let mate = mates.as_mut().and_then(Iterator::next);
                    if predicate(&record) {
                        if let Some(b) = true_side.push(&source, record, mate) {
                            yes.push(b);
                        }
                    } else if let Some(b) = false_side.push(&source, record, mate) {
                        no.push(b);
                    }
                }
            }
            if let Some(b) = true_side.flush() {
                yes.push(b);
            }
            if let Some(b) = false_side.flush() {
                no.push(b);
            }
            yes.done();
            no.done();
        });
        spawn_closer(&accepted);
        spawn_closer(&rejected);
        (accepted, rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObiError;

    fn records(n: usize) -> Vec<BioSequence> {
        (0..n)
            .map(|i| BioSequence::new(format!("s{}", i), "acgt".repeat(i % 3), ""))
            .collect()
    }

    #[test]
    fn test_make_worker_preserves_batch_identity() {
        let input = BioSequenceIter::from_records(records(50), 7, "lib");
        let out = input.make_worker(
            |mut s| {
                s.set_attribute("seen", true);
                Ok(vec![s])
            },
            true,
            4,
        );
        let mut batches: Vec<BioSequenceBatch> = out.collect();
        batches.sort_by_key(|b| b.order);
        let orders: Vec<usize> = batches.iter().map(|b| b.order).collect();
        assert_eq!(orders, (0..8).collect::<Vec<_>>());
        assert!(batches.iter().all(|b| b.source == "lib"));
        assert_eq!(batches.iter().map(BioSequenceBatch::len).sum::<usize>(), 50);
        assert!(batches[0].slice[0].get_bool_attribute("seen").unwrap());
    }

    #[test]
    fn test_make_worker_drops_failing_records() {
        let input = BioSequenceIter::from_records(records(10), 4, "lib");
        let out = input.make_worker(
            |s| {
                if s.id() == "s3" {
                    Err(ObiError::Other("bad record".into()))
                } else {
                    Ok(vec![s])
                }
            },
            false,
            2,
        );
        let ids: Vec<String> = out.load().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids.len(), 9);
        assert!(!ids.contains(&"s3".to_string()));
    }

    #[test]
    fn test_worker_clones_mates_for_multiple_outputs() {
        let fwd = vec![BioSequence::new("r0", "aaaa", ""), BioSequence::new("r1", "cccc", "")];
        let rev = vec![BioSequence::new("r0", "tttt", ""), BioSequence::new("r1", "gggg", "")];
        let batch = BioSequenceBatch::paired("lib", 0, fwd, rev).unwrap();
        let out: Vec<BioSequenceBatch> = BioSequenceIter::from_batches(vec![batch])
            .make_worker(
                |s| match s.id() {
                    "r0" => Ok(vec![s.clone(), s]),
                    _ => Ok(Vec::new()),
                },
                true,
                1,
            )
            .collect();
        let b = &out[0];
        assert_eq!(b.len(), 2);
        let mates = b.mates.as_ref().unwrap();
        assert_eq!(mates.len(), 2);
        assert!(mates.iter().all(|m| m.sequence() == b"tttt"));
    }

    #[test]
    fn test_filter_empty() {
        let input = BioSequenceIter::from_records(records(9), 4, "lib");
        let kept = input.filter_empty(3).load();
        assert_eq!(kept.len(), 6);
        assert!(kept.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_divide_on_keeps_separate_orders() {
        let input = BioSequenceIter::from_records(records(20), 3, "lib");
        let (even, odd) = input.divide_on(
            |s| s.id().trim_start_matches('s').parse::<usize>().unwrap_or(0) % 2 == 0,
            4,
        );
        let odd_handle = thread::spawn(move || odd.collect::<Vec<_>>());
        let even: Vec<BioSequenceBatch> = even.collect();
        let odd = odd_handle.join().unwrap();

        assert_eq!(even.iter().map(|b| b.order).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(odd.iter().map(|b| b.order).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(even[0].slice[1].id(), "s2");
        assert_eq!(odd[2].len(), 2);
    }
}
