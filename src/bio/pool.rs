use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Buffers larger than this are released instead of pooled.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

/// Lock-free pool of byte buffers recycled between records.
///
/// A buffer handed back through [`put`](Self::put) is cleared first, and a
/// buffer returned by [`get`](Self::get) is owned by exactly one caller.
///
/// Pooling is opt-in. The readers allocate their own buffers; callers that
/// drop many records in a loop can hand them back with
/// [`BioSequence::recycle`](crate::BioSequence::recycle) and draw from the
/// pool when building new ones.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: SegQueue<Vec<u8>>,
    reused: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an empty buffer with at least `capacity` bytes reserved.
    pub fn get(&self, capacity: usize) -> Vec<u8> {
        match self.buffers.pop() {
            Some(mut buf) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                buf.reserve(capacity);
                buf
            }
            None => Vec::with_capacity(capacity),
        }
    }

    pub fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() == 0 || buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        self.buffers.push(buf);
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Number of `get` calls served from the pool.
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }
}
