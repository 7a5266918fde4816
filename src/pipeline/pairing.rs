use crate::bio::BioSequenceBatch;
use crate::pipeline::{fatal, spawn_closer, BioSequenceIter};
use crate::ObiError;
use std::thread;

impl BioSequenceIter {
    /// Zips this stream with `reverse` into a stream of paired batches.
    ///
    /// Both sides are sorted first; batch `i` of each side must carry the
    /// same number of records. A mismatch aborts the process.
    pub fn pair_with(self, reverse: BioSequenceIter) -> BioSequenceIter {
        let forward = self.sort_batches();
        let reverse = reverse.sort_batches();
        let out = forward.sibling_stream();
        out.mark_as_paired();
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut reverse = reverse;
            for fwd in forward {
                let rev = match reverse.next() {
                    Some(rev) => rev,
                    None => fatal(ObiError::Format(format!(
                        "reverse reads exhausted before forward batch {} of {}",
                        fwd.order, fwd.source
                    ))),
                };
                if fwd.order != rev.order {
                    fatal(ObiError::Format(format!(
                        "cannot pair batch {} with batch {}",
                        fwd.order, rev.order
                    )));
                }
                let (fwd, _) = fwd.unpair();
                let (rev, _) = rev.unpair();
                match BioSequenceBatch::paired(fwd.source, fwd.order, fwd.slice, rev.slice) {
                    Ok(batch) => producer.push(batch),
                    Err(err) => fatal(err),
                }
            }
            if let Some(rev) = reverse.next() {
                fatal(ObiError::Format(format!(
                    "forward reads exhausted before reverse batch {} of {}",
                    rev.order, rev.source
                )));
            }
            producer.done();
        });
        spawn_closer(&out);
        out
    }

    /// Splits a paired stream into its forward and reverse sides. Unpaired
    /// batches yield an empty reverse batch with the same order.
    ///
    /// Both returned streams must be drained concurrently.
    pub fn unpair(self) -> (BioSequenceIter, BioSequenceIter) {
        let forward = self.sibling_stream();
        let reverse = self.sibling_stream();
        forward.add(1);
        reverse.add(1);
        let (f, r) = (forward.split(), reverse.split());
        thread::spawn(move || {
            for batch in self {
                let (fwd, rev) = batch.unpair();
                let rev = rev.unwrap_or_else(|| {
                    BioSequenceBatch::new(fwd.source.clone(), fwd.order, Vec::new())
                });
                f.push(fwd);
                r.push(rev);
            }
            f.done();
            r.done();
        });
        spawn_closer(&forward);
        spawn_closer(&reverse);
        (forward, reverse)
    }
}
