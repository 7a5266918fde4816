use crate::formats::compression::{decompress, Compression};
use crate::{ObiError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Where an input stream comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    /// Standard output of a shell command, written `|cmd`.
    Command(String),
    Url(String),
    File(PathBuf),
}

impl InputSource {
    pub fn parse(spec: &str) -> Self {
        if spec == "-" {
            InputSource::Stdin
        } else if let Some(cmd) = spec.strip_prefix('|') {
            InputSource::Command(cmd.trim().to_string())
        } else if spec.starts_with("http://") || spec.starts_with("https://") {
            InputSource::Url(spec.to_string())
        } else {
            InputSource::File(expand_tilde(spec))
        }
    }

    /// Short name identifying the stream in batches and messages: the base
    /// name with compression and format extensions removed.
    pub fn name(&self) -> String {
        match self {
            InputSource::Stdin => "stdin".to_string(),
            InputSource::Command(cmd) => cmd
                .split_whitespace()
                .next()
                .unwrap_or("pipe")
                .to_string(),
            InputSource::Url(url) => {
                let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
                source_name(Path::new(last))
            }
            InputSource::File(path) => source_name(path),
        }
    }

    /// Opens the raw byte stream, before decompression.
    fn open_raw(&self) -> Result<Box<dyn Read + Send>> {
        Ok(match self {
            InputSource::Stdin => Box::new(io::stdin()),
            InputSource::Command(cmd) => {
                debug!("reading from command `{}`", cmd);
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .stdout(Stdio::piped())
                    .spawn()?;
                match child.stdout.take() {
                    Some(stdout) => Box::new(stdout),
                    None => return Err(ObiError::Other(format!("no output from `{}`", cmd))),
                }
            }
            InputSource::Url(url) => {
                debug!("downloading {}", url);
                let response = reqwest::blocking::get(url)
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| ObiError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
                Box::new(response)
            }
            InputSource::File(path) => Box::new(File::open(path).map_err(|e| {
                ObiError::Io(io::Error::new(
                    e.kind(),
                    format!("cannot open {}: {}", path.display(), e),
                ))
            })?),
        })
    }

    /// Opens the stream with transparent decompression.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        decompress(self.open_raw()?)
    }
}

fn expand_tilde(spec: &str) -> PathBuf {
    let Some(rest) = spec.strip_prefix('~') else {
        return PathBuf::from(spec);
    };
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(spec);
    };
    let (user, path) = match rest.find('/') {
        Some(i) => (&rest[..i], rest[i + 1..].to_string()),
        None => (rest, String::new()),
    };
    if user.is_empty() {
        home.join(path)
    } else {
        match home.parent() {
            Some(homes) => homes.join(user).join(path),
            None => PathBuf::from(spec),
        }
    }
}

const KNOWN_EXTENSIONS: &[&str] = &[
    "gz", "gzip", "zst", "zstd", "xz", "bz2", "fasta", "fa", "fna", "faa", "fas", "fastq", "fq",
    "embl", "dat", "gb", "gbk", "genbank", "gbff", "ecopcr", "csv", "json", "txt", "seq",
];

/// Base name of `path` without its known extensions.
pub fn source_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    while let Some((stem, ext)) = name.rsplit_once('.') {
        if stem.is_empty() || !KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            break;
        }
        name = stem.to_string();
    }
    name
}

/// Opens an output sink. `-` is standard output. Compression is taken from
/// `compression` when given, from the file extension otherwise.
pub fn open_output(
    target: &str,
    append: bool,
    compression: Option<Compression>,
) -> Result<Box<dyn Write + Send>> {
    if target == "-" {
        let compression = compression.unwrap_or_default();
        return compression.encoder(BufWriter::new(io::stdout()));
    }
    let path = expand_tilde(target);
    let compression = compression.unwrap_or_else(|| Compression::from_extension(&path));
    let file = if append {
        OpenOptions::new().create(true).append(true).open(&path)?
    } else {
        File::create(&path)?
    };
    debug!("writing {} ({:?})", path.display(), compression);
    compression.encoder(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("-", InputSource::Stdin)]
    #[case("|zcat x.gz", InputSource::Command("zcat x.gz".into()))]
    #[case("https://host/a.fasta", InputSource::Url("https://host/a.fasta".into()))]
    #[case("data/a.fasta", InputSource::File(PathBuf::from("data/a.fasta")))]
    fn test_parse_source(#[case] spec: &str, #[case] expected: InputSource) {
        assert_eq!(InputSource::parse(spec), expected);
    }

    #[rstest]
    #[case("reads.fastq.gz", "reads")]
    #[case("sample.v2.fasta", "sample.v2")]
    #[case("noext", "noext")]
    #[case(".hidden.fa", ".hidden")]
    fn test_source_name(#[case] file: &str, #[case] expected: &str) {
        assert_eq!(source_name(Path::new(file)), expected);
    }

    #[test]
    fn test_compressed_output_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.fasta.gz");
        {
            let mut out = open_output(path.to_str().unwrap(), false, None).unwrap();
            out.write_all(b">a\nacgt\n").unwrap();
        }
        let mut text = String::new();
        InputSource::File(path).open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, ">a\nacgt\n");
    }

    #[test]
    fn test_command_source() {
        let mut text = String::new();
        InputSource::parse("|printf '>a\\nac\\n'")
            .open()
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, ">a\nac\n");
    }
}
