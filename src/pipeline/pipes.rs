use crate::pipeline::WaitGroup;
use once_cell::sync::Lazy;

static PIPES: Lazy<WaitGroup> = Lazy::new(WaitGroup::new);

/// Declares one more writer still flushing output.
pub fn register_pipe() {
    PIPES.add(1);
}

pub fn unregister_pipe() {
    PIPES.done();
}

/// Blocks until every registered writer has finished.
pub fn wait_pipes() {
    PIPES.wait();
}

pub fn active_pipes() -> usize {
    PIPES.count()
}
