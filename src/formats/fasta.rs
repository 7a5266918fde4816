use crate::bio::iupac::normalize_residue;
use crate::bio::BioSequence;
use crate::formats::header::{format_header, parse_header};
use crate::formats::{FormatOptions, ParseOptions};
use crate::{ObiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekRecord,
    SeekId,
    InId,
    SeekDefinition,
    InDefinition,
    SeekSequence,
    InSequence,
}

#[inline]
fn is_eol(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

#[inline]
fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

struct Pending {
    id: Vec<u8>,
    definition: Vec<u8>,
    sequence: Vec<u8>,
}

impl Pending {
    fn new() -> Self {
        Self {
            id: Vec::with_capacity(32),
            definition: Vec::with_capacity(128),
            sequence: Vec::with_capacity(1024),
        }
    }

    fn take(&mut self, options: &ParseOptions) -> BioSequence {
        let id = String::from_utf8_lossy(&self.id).into_owned();
        let title = String::from_utf8_lossy(&self.definition).into_owned();
        let mut record = BioSequence::new(id, std::mem::take(&mut self.sequence), "");
        if options.parse_header {
            parse_header(&title, &mut record);
        } else {
            record.set_definition(title.trim());
        }
        record.set_source(options.source.clone());
        self.id.clear();
        self.definition.clear();
        record
    }
}

/// Parses a chunk of FASTA records.
pub fn parse(raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    let mut records = Vec::new();
    let mut state = State::SeekRecord;
    let mut pending = Pending::new();
    let mut previous = b'\n';

    for (offset, &b) in raw.iter().enumerate() {
        match state {
            State::SeekRecord => {
                if b == b'>' {
                    state = State::SeekId;
                } else if !b.is_ascii_whitespace() {
                    return Err(ObiError::parse(
                        &options.source,
                        offset,
                        format!("unexpected byte {:?} before the first record", b as char),
                    ));
                }
            }
            State::SeekId => {
                if is_eol(b) {
                    return Err(ObiError::parse(
                        &options.source,
                        offset,
                        "record without identifier",
                    ));
                }
                if !is_space(b) {
                    pending.id.push(b);
                    state = State::InId;
                }
            }
            State::InId => {
                if is_eol(b) {
                    state = State::SeekSequence;
                } else if is_space(b) {
                    state = State::SeekDefinition;
                } else {
                    pending.id.push(b);
                }
            }
            State::SeekDefinition => {
                if is_eol(b) {
                    state = State::SeekSequence;
                } else if !is_space(b) {
                    pending.definition.push(b);
                    state = State::InDefinition;
                }
            }
            State::InDefinition => {
                if is_eol(b) {
                    state = State::SeekSequence;
                } else {
                    pending.definition.push(b);
                }
            }
            State::SeekSequence | State::InSequence => {
                if b == b'>' && is_eol(previous) {
                    records.push(pending.take(options));
                    state = State::SeekId;
                } else if let Some(r) = normalize_residue(b) {
                    pending.sequence.push(r);
                    state = State::InSequence;
                }
            }
        }
        previous = b;
    }

    match state {
        State::SeekRecord => {}
        State::SeekId => {
            return Err(ObiError::parse(&options.source, raw.len(), "record without identifier"));
        }
        _ => records.push(pending.take(options)),
    }
    Ok(records)
}

/// Appends the FASTA form of `record` to `out`.
pub fn format_record(record: &BioSequence, options: &FormatOptions, out: &mut Vec<u8>) {
    out.push(b'>');
    out.extend_from_slice(record.id().as_bytes());
    let header = format_header(record, options.header_format);
    if !header.is_empty() {
        out.push(b' ');
        out.extend_from_slice(header.as_bytes());
    }
    out.push(b'\n');
    let sequence = record.sequence();
    if options.line_width == 0 || sequence.is_empty() {
        out.extend_from_slice(sequence);
        out.push(b'\n');
    } else {
        for line in sequence.chunks(options.line_width) {
            out.extend_from_slice(line);
            out.push(b'\n');
        }
    }
}
