//! Sequence file formats: sources, chunking, parsers and writers.

pub mod chunk;
pub mod compression;
pub mod csv;
pub mod ecopcr;
pub mod embl;
pub mod fasta;
pub mod fastq;
pub mod genbank;
pub mod header;
pub mod json;
pub mod reader;
pub mod sniff;
pub mod source;
pub mod writer;

pub use compression::Compression;
pub use header::HeaderFormat;
pub use reader::{parse_bytes, read_files, read_paired, read_sequences, ReaderOptions};
pub use source::InputSource;
pub use writer::{paired_names, write_paired, write_sequences, WriterOptions};

use crate::bio::BioSequence;
use crate::{ObiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default ASCII offset of quality scores.
pub const DEFAULT_QUALITY_SHIFT: u8 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Fasta,
    Fastq,
    Embl,
    Genbank,
    EcoPcr,
    Csv,
    Json,
}

impl Format {
    /// Record boundary finder used by the chunker. JSON has none and is
    /// parsed as a single stream.
    pub fn record_end(self) -> Option<chunk::RecordEnd> {
        match self {
            Format::Fasta => Some(chunk::fasta_record_end),
            Format::Fastq => Some(chunk::fastq_record_end),
            Format::Embl | Format::Genbank => Some(chunk::flatfile_record_end),
            Format::EcoPcr => Some(chunk::line_record_end),
            Format::Csv => Some(chunk::csv_record_end),
            Format::Json => None,
        }
    }

    /// Whether every chunk needs the first line of the stream to parse.
    pub fn has_header_row(self) -> bool {
        self == Format::Csv
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Fasta => "fasta",
            Format::Fastq => "fastq",
            Format::Embl => "embl",
            Format::Genbank => "gb",
            Format::EcoPcr => "ecopcr",
            Format::Csv => "csv",
            Format::Json => "json",
        }
    }

    /// Whether records of this format can be written.
    pub fn is_writable(self) -> bool {
        matches!(self, Format::Fasta | Format::Fastq | Format::Csv | Format::Json)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Fasta => "fasta",
            Format::Fastq => "fastq",
            Format::Embl => "embl",
            Format::Genbank => "genbank",
            Format::EcoPcr => "ecopcr",
            Format::Csv => "csv",
            Format::Json => "json",
        };
        f.write_str(name)
    }
}

impl FromStr for Format {
    type Err = ObiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fasta" | "fa" => Ok(Format::Fasta),
            "fastq" | "fq" => Ok(Format::Fastq),
            "embl" => Ok(Format::Embl),
            "genbank" | "gb" => Ok(Format::Genbank),
            "ecopcr" => Ok(Format::EcoPcr),
            "csv" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            other => Err(ObiError::Format(format!("unknown format `{}`", other))),
        }
    }
}

/// Settings shared by every parser.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Stream name stored on records and used in error messages.
    pub source: String,
    pub quality_shift: u8,
    /// Keep the feature table of EMBL and GenBank entries.
    pub with_features: bool,
    /// Decode OBI or JSON annotations from FASTA/FASTQ title lines.
    pub parse_header: bool,
    pub na: String,
    pub csv_separator: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            source: String::new(),
            quality_shift: DEFAULT_QUALITY_SHIFT,
            with_features: false,
            parse_header: true,
            na: "NA".to_string(),
            csv_separator: b',',
        }
    }
}

/// Settings shared by every formatter.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub quality_shift: u8,
    pub header_format: HeaderFormat,
    /// FASTA line width, 0 for single-line sequences.
    pub line_width: usize,
    pub na: String,
    pub csv_columns: Vec<String>,
    pub csv_separator: u8,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            quality_shift: DEFAULT_QUALITY_SHIFT,
            header_format: HeaderFormat::Obi,
            line_width: 0,
            na: "NA".to_string(),
            csv_columns: Vec::new(),
            csv_separator: b',',
        }
    }
}

/// Parses one chunk of raw bytes.
pub fn parse_chunk(format: Format, raw: &[u8], options: &ParseOptions) -> Result<Vec<BioSequence>> {
    match format {
        Format::Fasta => fasta::parse(raw, options),
        Format::Fastq => fastq::parse(raw, options),
        Format::Embl => embl::parse(raw, options),
        Format::Genbank => genbank::parse(raw, options),
        Format::EcoPcr => ecopcr::parse(raw, options),
        Format::Csv => csv::parse(raw, options),
        Format::Json => json::parse(raw, options),
    }
}

/// Formats records. `first` marks the records opening the output, which
/// matters for the CSV header row and the JSON array separators.
pub fn format_records(
    format: Format,
    records: &[BioSequence],
    options: &FormatOptions,
    first: bool,
) -> Result<Vec<u8>> {
    match format {
        Format::Fasta => {
            let mut out = Vec::with_capacity(records.iter().map(|r| r.len() + 64).sum());
            for r in records {
                fasta::format_record(r, options, &mut out);
            }
            Ok(out)
        }
        Format::Fastq => {
            let mut out = Vec::with_capacity(records.iter().map(|r| 2 * r.len() + 64).sum());
            for r in records {
                fastq::format_record(r, options, &mut out);
            }
            Ok(out)
        }
        Format::Csv => csv::format_records(records, options, first),
        Format::Json => json::format_records(records, options, first),
        other => Err(ObiError::Format(format!("writing {} is not supported", other))),
    }
}
