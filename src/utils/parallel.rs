/// Parallel processing utilities

/// Worker count used when none is configured: the hardware parallelism.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Resolves a configured worker count, 0 meaning "one per core".
pub fn resolve_workers(workers: usize) -> usize {
    if workers == 0 {
        default_workers()
    } else {
        workers
    }
}

pub fn configure_thread_pool(threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(resolve_workers(threads))
        .build_global()
}

/// Records handed to each rayon task when splitting `total_items`.
pub fn chunk_size_for_parallelism(total_items: usize, threads: usize) -> usize {
    let threads = if threads == 0 {
        rayon::current_num_threads()
    } else {
        threads
    };

    // Aim for at least 10 items per thread, but not more than 1000 per chunk
    let ideal_chunk = total_items / (threads * 10);
    ideal_chunk.clamp(10, 1000)
}
