use crate::bio::BioSequenceBatch;
use crate::pipeline::{spawn_closer, BatchBuilder, BioSequenceIter};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

impl BioSequenceIter {
    /// Re-emits batches in `order` sequence, starting from 0.
    ///
    /// Out-of-order batches wait in a map keyed by `order`. If the input
    /// ends with a gap, the remaining batches are flushed in sorted order.
    pub fn sort_batches(self) -> BioSequenceIter {
        let out = self.sibling_stream();
        if self.is_paired() {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut pending: BTreeMap<usize, BioSequenceBatch> = BTreeMap::new();
            let mut next = 0usize;
            for batch in self {
                if batch.order == next {
                    producer.push(batch);
                    next += 1;
                    while let Some(b) = pending.remove(&next) {
                        producer.push(b);
                        next += 1;
                    }
                } else {
                    pending.insert(batch.order, batch);
                }
            }
            if !pending.is_empty() {
                warn!(
                    "{} batches left unsorted after order {}; flushing them",
                    pending.len(),
                    next
                );
                for (_, batch) in pending {
                    producer.push(batch);
                }
            }
            producer.done();
        });
        spawn_closer(&out);
        out
    }

    /// Re-slices the sorted stream into batches of exactly `size` records
    /// (the last one may be shorter), renumbered from 0.
    pub fn rebatch(self, size: usize) -> BioSequenceIter {
        let paired = self.is_paired();
        let sorted = self.sort_batches();
        let out = sorted.sibling_stream();
        out.set_batch_size(size);
        if paired {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut builder = BatchBuilder::new(size, paired);
            for batch in sorted {
                let source = batch.source;
                let mut mates = batch.mates.map(Vec::into_iter);
                for record in batch.slice {
                    let mate = mates.as_mut().and_then(Iterator::next);
                    if let Some(b) = builder.push(&source, record, mate) {
                        producer.push(b);
                    }
                }
            }
            if let Some(b) = builder.flush() {
                producer.push(b);
            }
            producer.done();
        });
        spawn_closer(&out);
        out
    }

    /// Serializes the iterators end to end, renumbering batches across them.
    pub fn concat(iters: Vec<BioSequenceIter>) -> BioSequenceIter {
        let out = BioSequenceIter::new();
        if iters.iter().any(BioSequenceIter::is_paired) {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut order = 0usize;
            for (i, iter) in iters.into_iter().enumerate() {
                debug!("concatenating stream {}", i);
                for batch in iter.sort_batches() {
                    producer.push(batch.reorder(order));
                    order += 1;
                }
            }
            producer.done();
        });
        spawn_closer(&out);
        out
    }

    /// Interleaves the iterators, giving every batch a fresh number from a
    /// shared counter.
    pub fn pool(iters: Vec<BioSequenceIter>) -> BioSequenceIter {
        let out = BioSequenceIter::new();
        if iters.iter().any(BioSequenceIter::is_paired) {
            out.mark_as_paired();
        }
        let counter = Arc::new(AtomicUsize::new(0));
        out.add(iters.len());
        for iter in iters {
            let producer = out.split();
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for batch in iter {
                    let order = counter.fetch_add(1, Ordering::SeqCst);
                    producer.push(batch.reorder(order));
                }
                producer.done();
            });
        }
        spawn_closer(&out);
        out
    }
}
