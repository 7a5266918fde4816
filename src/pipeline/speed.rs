use crate::pipeline::{spawn_closer, BioSequenceIter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::thread;
use std::time::Duration;

/// Annotation holding the serial number assigned by `number_sequences`.
pub const SEQ_NUMBER: &str = "seq_number";

impl BioSequenceIter {
    /// Passthrough counting records on a stderr spinner.
    pub fn speed(self, message: &str) -> BioSequenceIter {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {pos} records ({per_sec})")
        {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));
        self.counted(bar)
    }

    fn counted(self, bar: ProgressBar) -> BioSequenceIter {
        let out = self.sibling_stream();
        if self.is_paired() {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            for batch in self {
                bar.inc(batch.len() as u64);
                producer.push(batch);
            }
            bar.finish();
            producer.done();
        });
        spawn_closer(&out);
        out
    }

    /// Writes a monotonically increasing `seq_number` on every record,
    /// starting at `start`. Mates receive the number of their forward read.
    ///
    /// Numbering follows arrival order, so with `force_reorder` the stream is
    /// sorted first.
    pub fn number_sequences(self, start: i64, force_reorder: bool) -> BioSequenceIter {
        let input = if force_reorder { self.sort_batches() } else { self };
        let out = input.sibling_stream();
        if input.is_paired() {
            out.mark_as_paired();
        }
        out.add(1);
        let producer = out.split();
        thread::spawn(move || {
            let mut next = start;
            for mut batch in input {
                for (i, record) in batch.slice.iter_mut().enumerate() {
                    record.set_attribute(SEQ_NUMBER, next);
                    if let Some(mate) = batch.mates.as_mut().and_then(|m| m.get_mut(i)) {
                        mate.set_attribute(SEQ_NUMBER, next);
                    }
                    next += 1;
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
    use crate::bio::{BioSequence, BioSequenceBatch};

    #[test]
    fn test_number_sequences_is_monotonic() {
        let batches = vec![
            BioSequenceBatch::new("m", 1, vec![BioSequence::new("c", "a", "")]),
            BioSequenceBatch::new(
                "m",
                0,
                vec![BioSequence::new("a", "a", ""), BioSequence::new("b", "a", "")],
            ),
        ];
        let records = BioSequenceIter::from_batches(batches)
            .number_sequences(1, true)
            .load();
        let numbers: Vec<i64> = records
            .iter()
            .filter_map(|s| s.get_int_attribute(SEQ_NUMBER))
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(records[2].id(), "c");
    }

    #[test]
    fn test_number_sequences_mirrors_mates() {
        let batch = BioSequenceBatch::paired(
            "m",
            0,
            vec![BioSequence::new("a", "aa", ""), BioSequence::new("b", "cc", "")],
            vec![BioSequence::new("a", "tt", ""), BioSequence::new("b", "gg", "")],
        )
        .unwrap();
        let out: Vec<BioSequenceBatch> = BioSequenceIter::from_batches(vec![batch])
            .number_sequences(10, true)
            .collect();
        let mates = out[0].mates.as_ref().unwrap();
        assert_eq!(mates[1].get_int_attribute(SEQ_NUMBER), Some(11));
    }

    #[test]
    fn test_speed_is_passthrough() {
        let records: Vec<BioSequence> =
            (0..5).map(|i| BioSequence::new(format!("s{}", i), "a", "")).collect();
        let bar = ProgressBar::hidden();
        let out = BioSequenceIter::from_records(records.clone(), 2, "m").counted(bar.clone());
        assert_eq!(out.load(), records);
        assert_eq!(bar.position(), 5);
    }
}
