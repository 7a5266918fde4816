use crate::pipeline::{spawn_closer, BioSequenceIter};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_secs(1);
const WARN_AFTER: Duration = Duration::from_secs(30);

struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
    total: u64,
}

impl MemoryProbe {
    fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let total = system.total_memory();
        Self {
            system,
            pid: sysinfo::get_current_pid().ok(),
            total,
        }
    }

    /// Resident memory of this process, in bytes.
    fn resident(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl BioSequenceIter {
    /// Holds batches back while the resident memory of the process exceeds
    /// `fraction` of the physical memory. A fraction outside `(0, 1)`
    /// disables the limit.
    pub fn limit_memory(self, fraction: f64) -> BioSequenceIter {
        if !(fraction > 0.0 && fraction < 1.0) {
            return self;
        }
        let out = self.sibling_stream();
        if self.is_paired() {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut probe = MemoryProbe::new();
            let limit = (probe.total as f64 * fraction) as u64;
            debug!("memory limit set to {} bytes", limit);
            for batch in self {
                let started = Instant::now();
                let mut backoff = INITIAL_BACKOFF;
                let mut warned = false;
                while probe.resident() > limit {
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    if !warned && started.elapsed() > WARN_AFTER {
                        warn!(
                            "batch {} waiting for memory for more than {:?}",
                            batch.order, WARN_AFTER
                        );
                        warned = true;
                    }
                }
                producer.push(batch);
            }
            producer.done();
        });
        spawn_closer(&out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::BioSequence;

    #[test]
    fn test_disabled_limit_is_identity() {
        let records = vec![BioSequence::new("a", "acgt", "")];
        let out = BioSequenceIter::from_records(records.clone(), 10, "m").limit_memory(0.0);
        assert_eq!(out.load(), records);
    }

    #[test]
    fn test_generous_limit_passes_batches() {
        let records: Vec<BioSequence> = (0..10)
            .map(|i| BioSequence::new(format!("s{}", i), "acgt", ""))
            .collect();
        let out = BioSequenceIter::from_records(records, 3, "m").limit_memory(0.99);
        assert_eq!(out.load().len(), 10);
    }
}
