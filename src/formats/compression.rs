use crate::Result;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const BZIP2_MAGIC: &[u8] = b"BZh";
const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];

/// Read buffer used for sources and decoders.
pub const READ_BUFFER_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
    Xz,
    Bzip2,
}

impl Compression {
    /// Detects a compressed stream from its leading bytes.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if head.starts_with(ZSTD_MAGIC) {
            Compression::Zstd
        } else if head.starts_with(XZ_MAGIC) {
            Compression::Xz
        } else if head.starts_with(BZIP2_MAGIC) {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") | Some("gzip") => Compression::Gzip,
            Some("zst") | Some("zstd") => Compression::Zstd,
            Some("xz") => Compression::Xz,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::None,
        }
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gz"),
            Compression::Zstd => Some("zst"),
            Compression::Xz => Some("xz"),
            Compression::Bzip2 => Some("bz2"),
        }
    }

    /// Wraps `writer` into the matching encoder. The encoder writes its
    /// trailer when dropped.
    pub fn encoder<W: Write + Send + 'static>(self, writer: W) -> Result<Box<dyn Write + Send>> {
        Ok(match self {
            Compression::None => Box::new(writer),
            Compression::Gzip => Box::new(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            Compression::Zstd => {
                Box::new(ZstdSink(Some(zstd::stream::write::Encoder::new(writer, 0)?)))
            }
            Compression::Xz => Box::new(xz2::write::XzEncoder::new(writer, 6)),
            Compression::Bzip2 => Box::new(bzip2::write::BzEncoder::new(
                writer,
                bzip2::Compression::default(),
            )),
        })
    }
}

/// Zstd encoder finishing its frame on drop.
struct ZstdSink<W: Write>(Option<zstd::stream::write::Encoder<'static, W>>);

impl<W: Write> Write for ZstdSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(enc) => enc.write(buf),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "zstd stream finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(enc) => enc.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for ZstdSink<W> {
    fn drop(&mut self) {
        if let Some(enc) = self.0.take() {
            if let Err(err) = enc.finish().and_then(|mut w| w.flush()) {
                tracing::error!("cannot finish zstd stream: {}", err);
            }
        }
    }
}

/// Sniffs the compression of `reader` and returns a buffered reader over the
/// decompressed bytes, with any UTF-8 byte order mark skipped.
pub fn decompress(reader: Box<dyn Read + Send>) -> Result<Box<dyn BufRead + Send>> {
    let mut buffered = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let compression = Compression::from_magic(buffered.fill_buf()?);
    let mut decoded: Box<dyn BufRead + Send> = match compression {
        Compression::None => Box::new(buffered),
        Compression::Gzip => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            flate2::read::MultiGzDecoder::new(buffered),
        )),
        Compression::Zstd => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            zstd::stream::read::Decoder::with_buffer(buffered)?,
        )),
        Compression::Xz => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            xz2::read::XzDecoder::new_multi_decoder(buffered),
        )),
        Compression::Bzip2 => Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            bzip2::read::MultiBzDecoder::new(buffered),
        )),
    };
    if compression != Compression::None {
        tracing::debug!("input is {:?} compressed", compression);
    }
    if decoded.fill_buf()?.starts_with(UTF8_BOM) {
        decoded.consume(UTF8_BOM.len());
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(compression: Compression, payload: &[u8]) -> Vec<u8> {
        let sink = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        struct Shared(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        {
            let mut enc = compression.encoder(Shared(sink.clone())).unwrap();
            enc.write_all(payload).unwrap();
        }
        let compressed = sink.lock().clone();
        let mut out = Vec::new();
        decompress(Box::new(Cursor::new(compressed)))
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_magic_sniffing_decodes_every_codec() {
        let payload = b">s1\nacgt\n".repeat(100);
        for c in [
            Compression::None,
            Compression::Gzip,
            Compression::Zstd,
            Compression::Xz,
            Compression::Bzip2,
        ] {
            assert_eq!(roundtrip(c, &payload), payload, "{:?}", c);
        }
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b">a\nac\n");
        let mut out = String::new();
        decompress(Box::new(Cursor::new(data)))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, ">a\nac\n");
    }

    #[test]
    fn test_extension() {
        assert_eq!(Compression::from_extension(Path::new("x.fasta.gz")), Compression::Gzip);
        assert_eq!(Compression::from_extension(Path::new("x.fq.zst")), Compression::Zstd);
        assert_eq!(Compression::from_extension(Path::new("x.fasta")), Compression::None);
    }
}
