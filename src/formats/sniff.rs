use crate::formats::Format;
use crate::{ObiError, Result};
use std::io::{BufRead, BufReader, Cursor, Read};

/// Bytes inspected to recognize a format.
pub const SNIFF_SIZE: usize = 128 * 1024;

/// Recognizes the format of a stream from its first bytes.
pub fn detect(head: &[u8]) -> Option<Format> {
    let start = head.iter().position(|b| !b.is_ascii_whitespace())?;
    let head = &head[start..];
    if head.starts_with(b"#") {
        return Some(Format::EcoPcr);
    }
    match head[0] {
        b'>' => return Some(Format::Fasta),
        b'@' => return Some(Format::Fastq),
        b'[' | b'{' => return Some(Format::Json),
        _ => {}
    }
    if head.starts_with(b"ID   ") {
        return Some(Format::Embl);
    }
    if head.starts_with(b"LOCUS       ") || contains(head, b"Genetic Sequence Data Bank") {
        return Some(Format::Genbank);
    }
    let first_line = head.split(|&b| b == b'\n').next().unwrap_or(head);
    let is_csv_header = first_line
        .split(|&b| b == b',' || b == b';' || b == b'\t')
        .any(|field| String::from_utf8_lossy(field).trim() == "id");
    is_csv_header.then_some(Format::Csv)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Reads the head of `reader`, detects its format and hands back a reader
/// that still yields the whole stream.
pub fn sniff(reader: Box<dyn BufRead + Send>) -> Result<(Format, Box<dyn BufRead + Send>)> {
    let mut reader = reader;
    let mut head = Vec::with_capacity(SNIFF_SIZE);
    (&mut reader).take(SNIFF_SIZE as u64).read_to_end(&mut head)?;
    let format = detect(&head)
        .ok_or_else(|| ObiError::Format("cannot recognize the input format".into()))?;
    let stream: Box<dyn BufRead + Send> = Box::new(BufReader::new(Cursor::new(head).chain(reader)));
    Ok((format, stream))
}
