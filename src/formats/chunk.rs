use crate::Result;
use std::io::{BufRead, Read};

/// Default number of bytes read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 22;

/// Offset, in `buf`, where the last possibly incomplete record begins.
/// `None` (or `Some(0)`) means no complete record fits in `buf` yet.
pub type RecordEnd = fn(&[u8]) -> Option<usize>;

/// A run of complete records cut from an input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub source: String,
    pub order: usize,
    pub raw: Vec<u8>,
}

/// Cuts a byte stream into chunks holding whole records only.
///
/// The unfinished tail of each read is carried over to the next chunk. When
/// no record boundary is found the buffer grows until one is, or until the
/// end of the stream.
pub struct Chunker {
    reader: Box<dyn BufRead + Send>,
    source: String,
    last_record_end: RecordEnd,
    chunk_size: usize,
    carry: Vec<u8>,
    order: usize,
    eof: bool,
    repeat_header: bool,
    header: Option<Vec<u8>>,
}

impl Chunker {
    pub fn new(
        reader: Box<dyn BufRead + Send>,
        source: impl Into<String>,
        last_record_end: RecordEnd,
    ) -> Self {
        Self::with_chunk_size(reader, source, last_record_end, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(
        reader: Box<dyn BufRead + Send>,
        source: impl Into<String>,
        last_record_end: RecordEnd,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            source: source.into(),
            last_record_end,
            chunk_size: chunk_size.max(16),
            carry: Vec::new(),
            order: 0,
            eof: false,
            repeat_header: false,
            header: None,
        }
    }

    /// Prepends the first line of the stream to every later chunk, so that
    /// each chunk of a CSV file parses with its column names.
    pub fn repeat_header(mut self) -> Self {
        self.repeat_header = true;
        self
    }

    /// Appends up to `n` bytes from the reader to `buf`. Returns the number
    /// of bytes read, 0 at end of stream.
    fn fill(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<usize> {
        let before = buf.len();
        (&mut self.reader).take(n as u64).read_to_end(buf)?;
        Ok(buf.len() - before)
    }

    fn emit(&mut self, mut raw: Vec<u8>) -> FileChunk {
        if self.repeat_header {
            match &self.header {
                Some(header) => {
                    let mut with_header = Vec::with_capacity(header.len() + raw.len());
                    with_header.extend_from_slice(header);
                    with_header.append(&mut raw);
                    raw = with_header;
                }
                None => {
                    let end = csv_line_ends(&raw).next().unwrap_or(raw.len());
                    self.header = Some(raw[..end].to_vec());
                }
            }
        }
        let chunk = FileChunk {
            source: self.source.clone(),
            order: self.order,
            raw,
        };
        self.order += 1;
        chunk
    }

    fn next_chunk(&mut self) -> Result<Option<FileChunk>> {
        if self.eof {
            return Ok(None);
        }
        let mut buf = std::mem::take(&mut self.carry);
        let mut want = self.chunk_size;
        loop {
            let read = self.fill(&mut buf, want)?;
            if read == 0 {
                self.eof = true;
                if buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Ok(Some(self.emit(buf)));
            }
            match (self.last_record_end)(&buf) {
                Some(end) if end > 0 => {
                    self.carry = buf.split_off(end);
                    return Ok(Some(self.emit(buf)));
                }
                _ => want = buf.len().max(self.chunk_size),
            }
        }
    }
}

impl Iterator for Chunker {
    type Item = Result<FileChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(err) => {
                self.eof = true;
                Some(Err(err))
            }
        }
    }
}

/// Start offsets of every line in `buf`.
fn line_starts(buf: &[u8]) -> Vec<usize> {
    std::iter::once(0)
        .chain(
            buf.iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        )
        .filter(|&i| i < buf.len())
        .collect()
}

/// A `>` at the start of a line.
pub fn fasta_record_end(buf: &[u8]) -> Option<usize> {
    let mut i = buf.len();
    while i > 0 {
        i -= 1;
        if buf[i] == b'>' && (i == 0 || buf[i - 1] == b'\n' || buf[i - 1] == b'\r') {
            return Some(i);
        }
    }
    None
}

/// A line starting with `@` whose second next line starts with `+`.
/// Quality lines beginning with `@` never satisfy this, because the line
/// two below them is a sequence line.
pub fn fastq_record_end(buf: &[u8]) -> Option<usize> {
    let starts = line_starts(buf);
    (0..starts.len()).rev().find_map(|i| {
        let header = starts[i];
        let plus = *starts.get(i + 2)?;
        (buf[header] == b'@' && buf[plus] == b'+').then_some(header)
    })
}

/// Just after the last `//` terminator line of an EMBL or GenBank flat file.
pub fn flatfile_record_end(buf: &[u8]) -> Option<usize> {
    let mut end = buf.len();
    while end > 0 {
        // find the last newline before `end`
        let nl = buf[..end].iter().rposition(|&b| b == b'\n')?;
        let line_start = buf[..nl].iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
        let line = &buf[line_start..nl];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line == b"//" {
            return Some(nl + 1);
        }
        end = line_start;
    }
    None
}

/// Offsets just after each newline that lies outside a quoted field.
fn csv_line_ends(buf: &[u8]) -> impl Iterator<Item = usize> + '_ {
    let mut quoted = false;
    buf.iter().enumerate().filter_map(move |(i, &b)| {
        match b {
            b'"' => quoted = !quoted,
            b'\n' if !quoted => return Some(i + 1),
            _ => {}
        }
        None
    })
}

/// Just after the last newline outside a quoted field. The buffer must
/// begin on a record boundary.
pub fn csv_record_end(buf: &[u8]) -> Option<usize> {
    csv_line_ends(buf).last()
}

/// Just after the last newline.
pub fn line_record_end(buf: &[u8]) -> Option<usize> {
    buf.iter().rposition(|&b| b == b'\n').map(|p| p + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn chunks(data: &str, splitter: RecordEnd, size: usize) -> Vec<String> {
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(data.as_bytes().to_vec()));
        Chunker::with_chunk_size(reader, "t", splitter, size)
            .map(|c| String::from_utf8(c.unwrap().raw).unwrap())
            .collect()
    }

    #[test]
    fn test_fasta_chunks_hold_whole_records() {
        let data = ">a\nacgtacgtacgt\n>b\ntttttttttttt\n>c\ngg\n";
        let parts = chunks(data, fasta_record_end, 16);
        assert_eq!(parts.concat(), data);
        for part in &parts {
            assert!(part.starts_with('>'));
        }
        assert!(parts.len() >= 2);
    }

    #[test]
    fn test_fastq_boundary_ignores_at_in_qualities() {
        let buf = b"@r1\nacgt\n+\n@@@@\n@r2\nacgt\n+\n";
        assert_eq!(fastq_record_end(buf), Some(16));
        assert_eq!(fastq_record_end(b"@r1\nacgt\n"), None);
    }

    #[test]
    fn test_flatfile_end() {
        let buf = b"ID   X\n//\nID   Y\nSQ\n";
        assert_eq!(flatfile_record_end(buf), Some(10));
        assert_eq!(flatfile_record_end(b"LOCUS  A\n//\r\n"), Some(13));
        assert_eq!(flatfile_record_end(b"ID   X\nSQ\n"), None);
    }

    #[test]
    fn test_csv_end_skips_quoted_newlines() {
        assert_eq!(csv_record_end(b"id,note\na,\"x\ny\"\nb,"), Some(16));
        assert_eq!(csv_record_end(b"id,note\na,\"x\ny"), Some(8));
        assert_eq!(csv_record_end(b"id,note"), None);
    }

    #[test]
    fn test_csv_chunks_repeat_header() {
        let data = format!("id,note\n{}", "r,\"a\nb\"\n".repeat(10));
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(data.clone().into_bytes()));
        let parts: Vec<String> = Chunker::with_chunk_size(reader, "t", csv_record_end, 16)
            .repeat_header()
            .map(|c| String::from_utf8(c.unwrap().raw).unwrap())
            .collect();
        assert!(parts.len() >= 2);
        for part in &parts {
            assert!(part.starts_with("id,note\n"));
        }
        let body: String = parts.iter().map(|p| &p["id,note\n".len()..]).collect();
        assert_eq!(format!("id,note\n{}", body), data);
    }

    #[test]
    fn test_orders_are_contiguous() {
        let data = "l1\nl2\nl3\nl4\nl5\n".repeat(20);
        let reader: Box<dyn BufRead + Send> = Box::new(Cursor::new(data.into_bytes()));
        let orders: Vec<usize> = Chunker::with_chunk_size(reader, "t", line_record_end, 16)
            .map(|c| c.unwrap().order)
            .collect();
        assert_eq!(orders, (0..orders.len()).collect::<Vec<_>>());
    }
}
