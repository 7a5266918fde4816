//! Batch-streaming runtime: bounded channels of [`BioSequenceBatch`]
//! connected by stages of sibling worker threads.
//!
//! A stage registers its workers on the output wait group with `add(n)`,
//! spawns one closer that calls `wait_and_close`, and lets each worker drain
//! its own `split()` of the input. Any stage that needs input order goes
//! through [`BioSequenceIter::sort_batches`] first.

pub mod distribute;
pub mod iterator;
pub mod memory;
pub mod ordering;
pub mod pairing;
pub mod pipes;
pub mod speed;
pub mod unique;
pub mod worker;

pub use distribute::{
    AnnotationClassifier, CompositeClassifier, HashClassifier, IDistribute, ResidueClassifier,
    SequenceClassifier,
};
pub use iterator::{BioSequenceIter, WaitGroup, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY};
pub use pipes::{register_pipe, unregister_pipe, wait_pipes};
pub use unique::{dereplicate, UniqueOptions};

use crate::bio::BioSequenceBatch;
use std::fmt::Display;
use tracing::error;

/// Logs `err` and aborts the process.
pub fn fatal(err: impl Display) -> ! {
    error!("{}", err);
    std::process::exit(1)
}

/// Spawns the closer of a stage: once all registered producers are done the
/// output channel is closed.
pub(crate) fn spawn_closer(out: &BioSequenceIter) {
    let closer = out.split();
    std::thread::spawn(move || closer.wait_and_close());
}

/// Accumulates records into fixed-size batches with a private order counter.
pub(crate) struct BatchBuilder {
    source: String,
    order: usize,
    size: usize,
    slice: Vec<crate::bio::BioSequence>,
    mates: Option<Vec<crate::bio::BioSequence>>,
}

impl BatchBuilder {
    pub(crate) fn new(size: usize, paired: bool) -> Self {
        let size = size.max(1);
        Self {
            source: String::new(),
            order: 0,
            size,
            slice: Vec::with_capacity(size),
            mates: paired.then(|| Vec::with_capacity(size)),
        }
    }

    pub(crate) fn push(
        &mut self,
        source: &str,
        record: crate::bio::BioSequence,
        mate: Option<crate::bio::BioSequence>,
    ) -> Option<BioSequenceBatch> {
        if self.slice.is_empty() {
            self.source.clear();
            self.source.push_str(source);
        }
        self.slice.push(record);
        if let (Some(mates), Some(mate)) = (self.mates.as_mut(), mate) {
            mates.push(mate);
        }
        if self.slice.len() >= self.size {
            self.flush()
        } else {
            None
        }
    }

    /// Emits the pending records, if any, as the next batch.
    pub(crate) fn flush(&mut self) -> Option<BioSequenceBatch> {
        if self.slice.is_empty() {
            return None;
        }
        let slice = std::mem::replace(&mut self.slice, Vec::with_capacity(self.size));
        let order = self.order;
        self.order += 1;
        let source = self.source.clone();
        match self.mates.as_mut() {
            Some(mates) => {
                let mates = std::mem::replace(mates, Vec::with_capacity(self.size));
                match BioSequenceBatch::paired(source, order, slice, mates) {
                    Ok(batch) => Some(batch),
                    Err(err) => fatal(err),
                }
            }
            None => Some(BioSequenceBatch::new(source, order, slice)),
        }
    }
}
