use crate::core::config::Config;
use crate::formats::chunk::DEFAULT_CHUNK_SIZE;
use crate::formats::{
    Format, FormatOptions, HeaderFormat, ParseOptions, ReaderOptions, WriterOptions,
};
use crate::taxonomy::{load_taxonomy, Taxonomy};
use crate::utils::resolve_workers;
use crate::{ObiError, Result};
use std::path::Path;
use std::sync::Arc;

/// Run-wide settings built once by the entry point and handed by
/// reference to readers, writers and stages.
#[derive(Debug, Clone)]
pub struct Context {
    pub taxonomy: Option<Arc<Taxonomy>>,
    pub quality_shift: u8,
    pub output_quality_shift: u8,
    pub batch_size: usize,
    pub workers: usize,
    pub read_workers: usize,
    pub channel_capacity: usize,
    pub memory_fraction: f64,
    pub na_value: String,
    pub csv_separator: u8,
    pub fasta_line_width: usize,
    pub header_format: HeaderFormat,
    pub fail_on_taxonomy: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Context {
    /// Settings of `config`, without loading the taxonomy.
    pub fn from_config(config: &Config) -> Self {
        let workers = resolve_workers(config.pipeline.workers);
        let read_workers = match config.pipeline.read_workers {
            0 => workers,
            n => n,
        };
        Self {
            taxonomy: None,
            quality_shift: config.format.input_quality_shift,
            output_quality_shift: config.format.output_quality_shift,
            batch_size: config.pipeline.batch_size.max(1),
            workers,
            read_workers,
            channel_capacity: config.pipeline.channel_capacity.max(1),
            memory_fraction: config.pipeline.memory_fraction,
            na_value: config.format.na_value.clone(),
            csv_separator: config.csv_separator(),
            fasta_line_width: config.format.fasta_line_width,
            header_format: config.format.header_format,
            fail_on_taxonomy: config.taxonomy.fail_on_error,
        }
    }

    /// Loads the taxonomy at `path` and keeps it for the run.
    pub fn load_taxonomy(&mut self, path: &Path) -> Result<Arc<Taxonomy>> {
        let taxonomy = Arc::new(load_taxonomy(path)?);
        self.taxonomy = Some(Arc::clone(&taxonomy));
        Ok(taxonomy)
    }

    /// The loaded taxonomy; an error when none was given.
    pub fn taxonomy(&self) -> Result<&Arc<Taxonomy>> {
        self.taxonomy.as_ref().ok_or_else(|| {
            ObiError::Taxonomy(format!(
                "no taxonomy loaded (use --taxonomy or {})",
                crate::core::config::TAXONOMY_ENV
            ))
        })
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            quality_shift: self.quality_shift,
            na: self.na_value.clone(),
            csv_separator: self.csv_separator,
            ..ParseOptions::default()
        }
    }

    pub fn reader_options(&self, format: Option<Format>) -> ReaderOptions {
        ReaderOptions {
            format,
            parse: self.parse_options(),
            workers: self.read_workers,
            batch_size: self.batch_size,
            channel_capacity: self.channel_capacity,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            quality_shift: self.output_quality_shift,
            header_format: self.header_format,
            line_width: self.fasta_line_width,
            na: self.na_value.clone(),
            csv_columns: Vec::new(),
            csv_separator: self.csv_separator,
        }
    }

    pub fn writer_options(&self, format: Format) -> WriterOptions {
        WriterOptions {
            format,
            format_options: self.format_options(),
            workers: self.workers,
            ..WriterOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.pipeline.workers = 3;
        config.format.input_quality_shift = 64;
        config.format.csv_separator = ";".to_string();
        let ctx = Context::from_config(&config);
        assert_eq!(ctx.workers, 3);
        assert_eq!(ctx.read_workers, 3);
        assert_eq!(ctx.reader_options(None).parse.quality_shift, 64);
        assert_eq!(ctx.writer_options(Format::Csv).format_options.csv_separator, b';');
        assert_eq!(ctx.writer_options(Format::Fastq).format_options.quality_shift, 33);
    }

    #[test]
    fn test_missing_taxonomy() {
        let ctx = Context::default();
        assert!(ctx.workers >= 1);
        assert!(matches!(ctx.taxonomy(), Err(ObiError::Taxonomy(_))));
    }
}
