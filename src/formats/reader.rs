use crate::bio::{BioSequence, BioSequenceBatch};
use crate::formats::chunk::{Chunker, FileChunk, DEFAULT_CHUNK_SIZE};
use crate::formats::sniff::sniff;
use crate::formats::{parse_chunk, Format, InputSource, ParseOptions};
use crate::pipeline::{fatal, BioSequenceIter, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY};
use crate::{ObiError, Result};
use crossbeam::channel::bounded;
use std::io::{BufRead, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// How inputs are read.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Forced input format; sniffed from the stream when `None`.
    pub format: Option<Format>,
    pub parse: ParseOptions,
    /// Number of parsing threads.
    pub workers: usize,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub chunk_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            format: None,
            parse: ParseOptions::default(),
            workers: crate::utils::parallel::default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Parses a byte slice in the current thread.
pub fn parse_bytes(
    format: Format,
    data: &[u8],
    options: &ParseOptions,
) -> Result<Vec<BioSequence>> {
    parse_chunk(format, data, options)
}

/// Opens `input` and streams its records.
///
/// `input` is a path, `-`, `|command` or an http(s) URL. Chunks are parsed
/// on `options.workers` threads and the stream is rebatched to
/// `options.batch_size` in input order. A malformed chunk ends the reading
/// of this input with an error log; a format inconsistency aborts.
pub fn read_sequences(input: &str, options: &ReaderOptions) -> Result<BioSequenceIter> {
    let source = InputSource::parse(input);
    let name = source.name();
    let stream = source.open()?;
    let (format, stream) = match options.format {
        Some(format) => (format, stream),
        None => sniff(stream)?,
    };
    info!("reading {} as {}", input, format);

    let mut parse_options = options.parse.clone();
    parse_options.source = name.clone();

    let Some(record_end) = format.record_end() else {
        let records = parse_chunk_stream(format, stream, &parse_options)?;
        let iter = BioSequenceIter::from_records(records, options.batch_size, &name);
        return Ok(iter);
    };

    let out = BioSequenceIter::with_capacity(options.channel_capacity);
    out.set_batch_size(options.batch_size);
    let workers = options.workers.max(1);
    let (chunk_tx, chunk_rx) = bounded::<FileChunk>(workers * 2);
    let failed = Arc::new(AtomicBool::new(false));
    let records_read = Arc::new(AtomicUsize::new(0));

    let mut chunker =
        Chunker::with_chunk_size(stream, name.clone(), record_end, options.chunk_size);
    if format.has_header_row() {
        chunker = chunker.repeat_header();
    }
    let chunker_failed = Arc::clone(&failed);
    thread::spawn(move || {
        for chunk in chunker {
            if chunker_failed.load(Ordering::Acquire) {
                break;
            }
            match chunk {
                Ok(chunk) => {
                    if chunk_tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(err) => fatal(err),
            }
        }
    });

    out.add(workers);
    for _ in 0..workers {
        let rx = chunk_rx.clone();
        let producer = out.split();
        let parse_options = parse_options.clone();
        let failed = Arc::clone(&failed);
        let records_read = Arc::clone(&records_read);
        thread::spawn(move || {
            for chunk in rx {
                let records = if failed.load(Ordering::Acquire) {
                    Vec::new()
                } else {
                    match parse_chunk(format, &chunk.raw, &parse_options) {
                        Ok(records) => records,
                        Err(err @ ObiError::Parse { .. }) => {
                            error!("{}; skipping the rest of {}", err, chunk.source);
                            failed.store(true, Ordering::Release);
                            Vec::new()
                        }
                        Err(err) => fatal(err),
                    }
                };
                records_read.fetch_add(records.len(), Ordering::Relaxed);
                producer.push(BioSequenceBatch::new(chunk.source, chunk.order, records));
            }
            producer.done();
        });
    }
    let closer = out.split();
    thread::spawn(move || {
        closer.wait_and_close();
        debug!("{} records read from {}", records_read.load(Ordering::Relaxed), name);
    });

    Ok(out.rebatch(options.batch_size))
}

fn parse_chunk_stream(
    format: Format,
    mut stream: Box<dyn BufRead + Send>,
    options: &ParseOptions,
) -> Result<Vec<BioSequence>> {
    match format {
        Format::Json => crate::formats::json::parse(stream, options),
        other => {
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw)?;
            parse_chunk(other, &raw, options)
        }
    }
}

/// Reads several inputs one after the other as a single stream.
pub fn read_files(inputs: &[String], options: &ReaderOptions) -> Result<BioSequenceIter> {
    let iters = inputs
        .iter()
        .map(|input| read_sequences(input, options))
        .collect::<Result<Vec<_>>>()?;
    let out = BioSequenceIter::concat(iters);
    out.set_batch_size(options.batch_size);
    Ok(out)
}

/// Reads forward and reverse files and pairs their records.
pub fn read_paired(
    forward: &str,
    reverse: &str,
    options: &ReaderOptions,
) -> Result<BioSequenceIter> {
    let fwd = read_sequences(forward, options)?;
    let rev = read_sequences(reverse, options)?;
    Ok(fwd.pair_with(rev))
}
