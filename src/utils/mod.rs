pub mod parallel;

pub use parallel::{configure_thread_pool, default_workers, resolve_workers};
