use crate::bio::BioSequenceBatch;
use crate::formats::source::open_output;
use crate::formats::{format_records, json, Compression, Format, FormatOptions};
use crate::pipeline::{fatal, register_pipe, unregister_pipe, BioSequenceIter};
use crate::Result;
use crossbeam::channel::bounded;
use std::collections::BTreeMap;
use std::io::Write;
use std::thread;
use tracing::{debug, info, warn};

/// How records are written.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub format: Format,
    pub format_options: FormatOptions,
    pub append: bool,
    /// Forced compression; inferred from the output extension when `None`.
    pub compression: Option<Compression>,
    /// Number of formatting threads.
    pub workers: usize,
    /// Write batches as soon as they are formatted, in any order.
    pub no_order: bool,
    /// Do not write records without residues.
    pub skip_empty: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            format: Format::Fasta,
            format_options: FormatOptions::default(),
            append: false,
            compression: None,
            workers: crate::utils::parallel::default_workers(),
            no_order: false,
            skip_empty: false,
        }
    }
}

struct Formatted {
    batch: BioSequenceBatch,
    bytes: Vec<u8>,
    /// Records rendered into `bytes`.
    records: usize,
}

/// Sink-side state of one output: framing of CSV and JSON documents.
struct Sink {
    out: Box<dyn Write + Send>,
    format: Format,
    options: FormatOptions,
    started: bool,
    with_csv_header: bool,
    written: usize,
}

impl Sink {
    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        match self.format {
            Format::Json => self.out.write_all(json::PREAMBLE)?,
            Format::Csv if self.with_csv_header => {
                let header = format_records(Format::Csv, &[], &self.options, true)?;
                self.out.write_all(&header)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write(&mut self, chunk: &Formatted) -> Result<()> {
        self.start()?;
        let mut bytes = chunk.bytes.as_slice();
        if self.format == Format::Json && self.written == 0 {
            bytes = bytes.strip_prefix(json::SEPARATOR).unwrap_or(bytes);
        }
        self.out.write_all(bytes)?;
        self.written += chunk.records;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.start()?;
        if self.format == Format::Json {
            if self.written == 0 {
                self.out.write_all(b"]\n")?;
            } else {
                self.out.write_all(json::POSTAMBLE)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Writes the stream to `target` (`-` for standard output) and returns a
/// passthrough stream of the written batches, which must be drained.
///
/// Batches are formatted on `options.workers` threads; unless `no_order` is
/// set they reach the sink in `order` sequence.
pub fn write_sequences(
    iter: BioSequenceIter,
    target: &str,
    options: &WriterOptions,
) -> Result<BioSequenceIter> {
    if !options.format.is_writable() {
        return Err(crate::ObiError::Format(format!("cannot write {} files", options.format)));
    }
    let out = open_output(target, options.append, options.compression)?;
    let mut sink = Sink {
        out,
        format: options.format,
        options: options.format_options.clone(),
        started: false,
        with_csv_header: !options.append,
        written: 0,
    };
    info!("writing {} to {}", options.format, target);
    register_pipe();

    let passthrough = iter.sibling_stream();
    if iter.is_paired() {
        passthrough.mark_as_paired();
    }
    passthrough.add(1);
    let producer = passthrough.split();

    let workers = options.workers.max(1);
    let (formatted_tx, formatted_rx) = bounded::<Formatted>(workers * 2);
    for _ in 0..workers {
        let input = iter.split();
        let tx = formatted_tx.clone();
        let format = options.format;
        let format_options = options.format_options.clone();
        let skip_empty = options.skip_empty;
        thread::spawn(move || {
            for batch in input {
                let (bytes, records) = if skip_empty {
                    let kept: Vec<_> =
                        batch.slice.iter().filter(|s| !s.is_empty()).cloned().collect();
                    (format_records(format, &kept, &format_options, false), kept.len())
                } else {
                    (format_records(format, &batch.slice, &format_options, false), batch.len())
                };
                let bytes = bytes.unwrap_or_else(|err| fatal(err));
                if tx.send(Formatted { batch, bytes, records }).is_err() {
                    break;
                }
            }
        });
    }
    drop(formatted_tx);
    drop(iter);

    let no_order = options.no_order;
    let target = target.to_string();
    thread::spawn(move || {
        let mut pending: BTreeMap<usize, Formatted> = BTreeMap::new();
        let mut next = 0usize;
        let emit = |chunk: Formatted, sink: &mut Sink| {
            if let Err(err) = sink.write(&chunk) {
                fatal(format!("cannot write {}: {}", target, err));
            }
            producer.push(chunk.batch);
        };
        for chunk in formatted_rx {
            if no_order {
                emit(chunk, &mut sink);
                continue;
            }
            if chunk.batch.order != next {
                pending.insert(chunk.batch.order, chunk);
                continue;
            }
            emit(chunk, &mut sink);
            next += 1;
            while let Some(chunk) = pending.remove(&next) {
                emit(chunk, &mut sink);
                next += 1;
            }
        }
        if !pending.is_empty() {
            warn!("{} batches written out of order after batch {}", pending.len(), next);
            for (_, chunk) in std::mem::take(&mut pending) {
                emit(chunk, &mut sink);
            }
        }
        let written = sink.written;
        if let Err(err) = sink.finish() {
            fatal(format!("cannot finish {}: {}", target, err));
        }
        debug!("{} records written to {}", written, target);
        producer.done();
        unregister_pipe();
    });

    crate::pipeline::spawn_closer(&passthrough);
    Ok(passthrough)
}

/// Names of the two mate files derived from `target`: `reads.fastq.gz`
/// gives `reads_R1.fastq.gz` and `reads_R2.fastq.gz`.
pub fn paired_names(target: &str) -> (String, String) {
    let (dir, file) = match target.rfind('/') {
        Some(i) => target.split_at(i + 1),
        None => ("", target),
    };
    let (stem, ext) = match file.find('.') {
        Some(i) if i > 0 => file.split_at(i),
        _ => (file, ""),
    };
    (
        format!("{}{}_R1{}", dir, stem, ext),
        format!("{}{}_R2{}", dir, stem, ext),
    )
}

/// Writes a paired stream to two files. Mates go to `reverse_target` when
/// given, else both names derive from `target` with `_R1`/`_R2` suffixes.
/// Returns the paired passthrough stream.
pub fn write_paired(
    iter: BioSequenceIter,
    target: &str,
    reverse_target: Option<&str>,
    options: &WriterOptions,
) -> Result<BioSequenceIter> {
    let (forward_name, reverse_name) = match reverse_target {
        Some(reverse) => (target.to_string(), reverse.to_string()),
        None => paired_names(target),
    };
    let (forward, reverse) = iter.unpair();
    let forward = write_sequences(forward, &forward_name, options)?;
    let reverse = write_sequences(reverse, &reverse_name, options)?;
    Ok(forward.pair_with(reverse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::BioSequence;
    use crate::formats::reader::{read_sequences, ReaderOptions};
    use crate::formats::HeaderFormat;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn records(n: usize) -> Vec<BioSequence> {
        (0..n)
            .map(|i| BioSequence::new(format!("s{}", i), "acgt", ""))
            .collect()
    }

    fn write_to(
        dir: &TempDir,
        name: &str,
        iter: BioSequenceIter,
        options: &WriterOptions,
    ) -> String {
        let path = dir.path().join(name);
        let target = path.to_str().unwrap().to_string();
        write_sequences(iter, &target, options).unwrap().consume();
        target
    }

    #[test]
    fn test_ordered_fasta_output() {
        let dir = TempDir::new().unwrap();
        let batches: Vec<BioSequenceBatch> = vec![
            BioSequenceBatch::new("m", 1, vec![BioSequence::new("s2", "tttt", "")]),
            BioSequenceBatch::new("m", 0, vec![BioSequence::new("s1", "ACGTACGT", "first")]),
        ];
        let options = WriterOptions {
            workers: 2,
            ..Default::default()
        };
        let path = write_to(&dir, "out.fasta", BioSequenceIter::from_batches(batches), &options);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, ">s1 first\nacgtacgt\n>s2\ntttt\n");
    }

    #[test]
    fn test_json_document_is_valid() {
        let dir = TempDir::new().unwrap();
        let options = WriterOptions {
            format: Format::Json,
            ..Default::default()
        };
        let input = BioSequenceIter::from_records(records(5), 2, "m");
        let path = write_to(&dir, "out.json", input, &options);
        let text = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_empty_json_document() {
        let dir = TempDir::new().unwrap();
        let options = WriterOptions {
            format: Format::Json,
            ..Default::default()
        };
        let input = BioSequenceIter::from_records(Vec::new(), 2, "m");
        let path = write_to(&dir, "empty.json", input, &options);
        let text = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.as_array().unwrap().is_empty());
    }

    #[test]
    fn test_json_skip_empty_leading_batch() {
        let dir = TempDir::new().unwrap();
        let input = vec![
            BioSequence::new("e1", "", ""),
            BioSequence::new("e2", "", ""),
            BioSequence::new("s3", "acgt", ""),
            BioSequence::new("s4", "acgt", ""),
        ];
        let options = WriterOptions {
            format: Format::Json,
            skip_empty: true,
            workers: 2,
            ..Default::default()
        };
        let input = BioSequenceIter::from_records(input, 2, "m");
        let path = write_to(&dir, "kept.json", input, &options);
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("[\n{"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let ids: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["s3", "s4"]);
    }

    #[test]
    fn test_csv_header_written_once() {
        let dir = TempDir::new().unwrap();
        let options = WriterOptions {
            format: Format::Csv,
            ..Default::default()
        };
        let input = BioSequenceIter::from_records(records(3), 1, "m");
        let path = write_to(&dir, "out.csv", input, &options);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert_eq!(text.matches("id,count").count(), 1);
    }

    #[test]
    fn test_gzip_output_reads_back() {
        let dir = TempDir::new().unwrap();
        let mut r = BioSequence::with_qualities("r1", "acgt", vec![30; 4], "").unwrap();
        r.set_attribute("count", 5i64);
        let options = WriterOptions {
            format: Format::Fastq,
            format_options: FormatOptions {
                header_format: HeaderFormat::Json,
                ..Default::default()
            },
            ..Default::default()
        };
        let input = BioSequenceIter::from_records(vec![r.clone()], 10, "m");
        let path = write_to(&dir, "out.fastq.gz", input, &options);
        let back = read_sequences(&path, &ReaderOptions::default()).unwrap().load();
        assert_eq!(back, vec![r]);
    }

    #[test]
    fn test_append_mode() {
        let dir = TempDir::new().unwrap();
        let options = WriterOptions::default();
        let input = BioSequenceIter::from_records(records(1), 1, "m");
        let path = write_to(&dir, "out.fasta", input, &options);
        let append = WriterOptions {
            append: true,
            ..Default::default()
        };
        write_sequences(BioSequenceIter::from_records(records(2), 1, "m"), &path, &append)
            .unwrap()
            .consume();
        assert_eq!(std::fs::read_to_string(path).unwrap().matches('>').count(), 3);
    }

    #[test]
    fn test_paired_names() {
        assert_eq!(
            paired_names("out/reads.fastq.gz"),
            ("out/reads_R1.fastq.gz".to_string(), "out/reads_R2.fastq.gz".to_string())
        );
        assert_eq!(paired_names("reads"), ("reads_R1".to_string(), "reads_R2".to_string()));
    }

    #[test]
    fn test_write_paired() {
        let dir = TempDir::new().unwrap();
        let batch = BioSequenceBatch::paired(
            "m",
            0,
            vec![BioSequence::new("r1", "aaaa", "")],
            vec![BioSequence::new("r1", "cccc", "")],
        )
        .unwrap();
        let target = dir.path().join("pairs.fasta");
        let out = write_paired(
            BioSequenceIter::from_batches(vec![batch]),
            target.to_str().unwrap(),
            None,
            &WriterOptions::default(),
        )
        .unwrap();
        assert_eq!(out.consume(), 1);
        let r2 = std::fs::read_to_string(dir.path().join("pairs_R2.fasta")).unwrap();
        assert_eq!(r2, ">r1\ncccc\n");
    }
}
