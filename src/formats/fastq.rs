use crate::bio::iupac::normalize_residue;
use crate::bio::BioSequence;
use crate::formats::header::{format_header, parse_header};
use crate::formats::{FormatOptions, ParseOptions};
use crate::{ObiError, Result};

/// Quality written for records that carry none.
const DEFAULT_QUALITY: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Sequence,
    Quality,
    /// Record complete; the next line must open a new one.
    Done,
}

struct Record<'a> {
    id: &'a str,
    title: &'a str,
    sequence: Vec<u8>,
    qualities: Vec<u8>,
}

fn split_title(line: &str) -> (&str, &str) {
    match line.find([' ', '\t']) {
        Some(i) => (&line[..i], line[i + 1..].trim()),
        None => (line, ""),
    }
}

fn finish(record: Record<'_>, options: &ParseOptions, offset: usize) -> Result<BioSequence> {
    if record.qualities.len() != record.sequence.len() {
        return Err(ObiError::Format(format!(
            "{}: record {} at byte {}: quality length {} differs from sequence length {}",
            options.source,
            record.id,
            offset,
            record.qualities.len(),
            record.sequence.len()
        )));
    }
    let mut seq = BioSequence::with_qualities(record.id, record.sequence, record.qualities, "")?;
    if options.parse_header {
        parse_header(record.title, &mut seq);
    } else {
        seq.set_definition(record.title);
    }
    seq.set_source(options.source.clone());
    Ok(seq)
}

/// Parses a chunk of FASTQ records.
///
/// Sequences may span several lines up to the `+` separator; quality lines
/// are read until they cover the sequence.
pub fn parse(raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let text = String::from_utf8_lossy(raw);
    let mut records = Vec::new();
    let mut state = State::Header;
    let mut current: Option<Record<'_>> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let line = line.trim_end_matches(['\n', '\r']);

        match state {
            State::Header | State::Done => {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(title) = line.strip_prefix('@') else {
                    return Err(ObiError::parse(
                        &options.source,
                        start,
                        format!("expected a line starting with '@', found {:?}", line),
                    ));
                };
                if let Some(done) = current.take() {
                    records.push(finish(done, options, start)?);
                }
                let (id, title) = split_title(title);
                if id.is_empty() {
                    return Err(ObiError::parse(
                        &options.source,
                        start,
                        "record without identifier",
                    ));
                }
                current = Some(Record {
                    id,
                    title,
                    sequence: Vec::with_capacity(256),
                    qualities: Vec::new(),
                });
                state = State::Sequence;
            }
            State::Sequence => {
                let Some(record) = current.as_mut() else {
                    continue;
                };
                if line.starts_with('+') {
                    record.qualities.reserve(record.sequence.len());
                    state = if record.sequence.is_empty() {
                        State::Done
                    } else {
                        State::Quality
                    };
                } else {
                    record
                        .sequence
                        .extend(line.bytes().filter_map(normalize_residue));
                }
            }
            State::Quality => {
                let Some(record) = current.as_mut() else {
                    continue;
                };
                for (i, q) in line.bytes().enumerate() {
                    if q < options.quality_shift {
                        return Err(ObiError::parse(
                            &options.source,
                            start + i,
                            format!(
                                "record {}: quality byte {} below shift {}",
                                record.id, q, options.quality_shift
                            ),
                        ));
                    }
                    record.qualities.push(q - options.quality_shift);
                }
                if record.qualities.len() >= record.sequence.len() {
                    state = State::Done;
                }
            }
        }
    }

    if let Some(record) = current.take() {
        if state == State::Sequence {
            return Err(ObiError::Format(format!(
                "{}: record {} ends before its quality line",
                options.source, record.id
            )));
        }
        records.push(finish(record, options, offset)?);
    }
    Ok(records)
}

pub fn format_record(record: &BioSequence, options: &FormatOptions, out: &mut Vec<u8>) {
    out.push(b'@');
    out.extend_from_slice(record.id().as_bytes());
    let header = format_header(record, options.header_format);
    if !header.is_empty() {
        out.push(b' ');
        out.extend_from_slice(header.as_bytes());
    }
    out.push(b'\n');
    out.extend_from_slice(record.sequence());
    out.extend_from_slice(b"\n+\n");
    match record.qualities() {
        Some(qualities) => {
            out.extend(qualities.iter().map(|q| q.saturating_add(options.quality_shift)))
        }
        None => out.extend(
            std::iter::repeat(DEFAULT_QUALITY + options.quality_shift).take(record.len()),
        ),
    }
    out.push(b'\n');
}
