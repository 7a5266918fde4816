use crate::bio::{BioSequence, BioSequenceBatch};
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::error;

/// Default depth of the channel between two stages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2;

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 2000;

/// Counter of active tasks that producers and closers synchronize on.
#[derive(Debug, Default)]
pub struct WaitGroup {
    count: Mutex<usize>,
    zero: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        *self.count.lock() += n;
    }

    pub fn done(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            error!("wait group released more often than acquired");
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Blocks until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

struct Shared {
    sender: RwLock<Option<Sender<BioSequenceBatch>>>,
    receiver: Receiver<BioSequenceBatch>,
    wait_group: WaitGroup,
    finished: AtomicBool,
    paired: AtomicBool,
    batch_size: AtomicUsize,
    capacity: usize,
}

/// Handle on a bounded stream of batches.
///
/// Every handle obtained through [`split`](Self::split) shares the same
/// channel and wait group, so several producers can push into it and several
/// consumers can drain it concurrently. The channel closes once
/// [`close`](Self::close) has been called and in-flight pushes have returned;
/// consumers then see the end of the stream.
pub struct BioSequenceIter {
    shared: Arc<Shared>,
    pushed_back: Option<BioSequenceBatch>,
}

impl BioSequenceIter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            shared: Arc::new(Shared {
                sender: RwLock::new(Some(sender)),
                receiver,
                wait_group: WaitGroup::new(),
                finished: AtomicBool::new(false),
                paired: AtomicBool::new(false),
                batch_size: AtomicUsize::new(DEFAULT_BATCH_SIZE),
                capacity,
            }),
            pushed_back: None,
        }
    }

    /// Creates a new, empty stream with the same channel capacity and batch size.
    pub fn sibling_stream(&self) -> Self {
        let iter = Self::with_capacity(self.shared.capacity);
        iter.set_batch_size(self.batch_size());
        iter
    }

    /// A stream that yields `records` cut into batches of `batch_size`.
    pub fn from_records(records: Vec<BioSequence>, batch_size: usize, source: &str) -> Self {
        let batch_size = batch_size.max(1);
        let batches: Vec<BioSequenceBatch> = records
            .chunks(batch_size)
            .enumerate()
            .map(|(order, chunk)| BioSequenceBatch::new(source, order, chunk.to_vec()))
            .collect();
        let iter = Self::from_batches(batches);
        iter.set_batch_size(batch_size);
        iter
    }

    /// A stream that yields the given batches in sequence.
    pub fn from_batches(batches: Vec<BioSequenceBatch>) -> Self {
        let iter = Self::new();
        if batches.iter().any(BioSequenceBatch::is_paired) {
            iter.mark_as_paired();
        }
        iter.add(1);
        let producer = iter.split();
        std::thread::spawn(move || {
            for batch in batches {
                producer.push(batch);
            }
            producer.done();
        });
        let closer = iter.split();
        std::thread::spawn(move || closer.wait_and_close());
        iter
    }

    /// Registers `n` more producer tasks.
    pub fn add(&self, n: usize) {
        self.shared.wait_group.add(n);
    }

    /// Signals that one producer task has finished.
    pub fn done(&self) {
        self.shared.wait_group.done();
    }

    /// Blocks until every registered producer has called [`done`](Self::done).
    pub fn wait(&self) {
        self.shared.wait_group.wait();
    }

    pub fn push(&self, batch: BioSequenceBatch) {
        let sender = self.shared.sender.read().clone();
        match sender {
            Some(sender) => {
                if sender.send(batch).is_err() {
                    error!("batch pushed on a stream without receivers");
                }
            }
            None => error!("batch {} pushed on a closed stream", batch.order),
        }
    }

    /// Re-queues `batch` so that the next call to `next` on this handle returns it.
    pub fn push_back(&mut self, batch: BioSequenceBatch) {
        self.pushed_back = Some(batch);
    }

    pub fn close(&self) {
        self.shared.sender.write().take();
    }

    pub fn wait_and_close(&self) {
        self.wait();
        self.close();
    }

    /// Returns a sibling handle draining the same channel.
    pub fn split(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pushed_back: None,
        }
    }

    /// True once a consumer has observed the end of the drained channel.
    pub fn finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    pub fn is_paired(&self) -> bool {
        self.shared.paired.load(Ordering::Acquire)
    }

    pub fn mark_as_paired(&self) {
        self.shared.paired.store(true, Ordering::Release);
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size.load(Ordering::Relaxed)
    }

    pub fn set_batch_size(&self, size: usize) {
        self.shared.batch_size.store(size.max(1), Ordering::Relaxed);
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Drains the stream and returns every record in batch order.
    pub fn load(self) -> Vec<BioSequence> {
        let mut batches: Vec<BioSequenceBatch> = self.collect();
        batches.sort_by_key(|b| b.order);
        batches.into_iter().flat_map(|b| b.slice).collect()
    }

    /// Drains the stream, discarding its content. Returns the number of records seen.
    pub fn consume(self) -> usize {
        self.map(|b| b.len()).sum()
    }
}

impl Default for BioSequenceIter {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for BioSequenceIter {
    type Item = BioSequenceBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(batch) = self.pushed_back.take() {
            return Some(batch);
        }
        match self.shared.receiver.recv() {
            Ok(batch) => Some(batch),
            Err(_) => {
                self.shared.finished.store(true, Ordering::Release);
                None
            }
        }
    }
}
