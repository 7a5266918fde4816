//! Option groups shared by the subcommands.

use crate::core::{load_config, Config, Context};
use crate::formats::{Compression, Format, HeaderFormat, WriterOptions};
use anyhow::Context as _;
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Worker threads per stage (0 = all available)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Parsing threads per input (0 = same as --workers)
    #[arg(long, value_name = "N")]
    pub read_workers: Option<usize>,

    /// Records per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Pause reading while memory use exceeds this fraction of the RAM
    #[arg(long, value_name = "FRACTION")]
    pub max_memory: Option<f64>,

    /// ASCII offset of input qualities
    #[arg(long, value_name = "N")]
    pub input_quality_shift: Option<u8>,

    /// Show a record counter on stderr
    #[arg(long)]
    pub progress: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaxonomyArgs {
    /// NCBI taxdump directory or CSV taxonomy
    #[arg(long, value_name = "DIR-OR-FILE")]
    pub taxonomy: Option<PathBuf>,

    /// Abort on unknown taxids instead of tagging records NA
    #[arg(long)]
    pub fail_on_taxonomy: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file (- for stdout)
    #[arg(short, long, default_value = "-", value_name = "FILE")]
    pub out: String,

    /// Append to the output file
    #[arg(long)]
    pub append: bool,

    /// Gzip the output when its name does not imply a compression
    #[arg(long)]
    pub compress: bool,

    /// Write mates to two files; `file:FILE` names the reverse file
    #[arg(long, value_name = "file:FILE")]
    pub paired_mode: Option<String>,

    #[arg(long, group = "output_format")]
    pub fasta_output: bool,

    #[arg(long, group = "output_format")]
    pub fastq_output: bool,

    #[arg(long, group = "output_format")]
    pub csv_output: bool,

    #[arg(long, group = "output_format")]
    pub json_output: bool,

    /// Encode FASTA/FASTQ annotations as JSON
    #[arg(long)]
    pub json_header: bool,

    /// Write batches as they come
    #[arg(long)]
    pub no_order: bool,

    /// Skip records without residues
    #[arg(long)]
    pub skip_empty: bool,

    /// ASCII offset of output qualities
    #[arg(long, value_name = "N")]
    pub output_quality_shift: Option<u8>,
}

impl OutputArgs {
    /// Requested format, or `fallback` when no flag is given.
    pub fn format(&self, fallback: Format) -> Format {
        if self.fasta_output {
            Format::Fasta
        } else if self.fastq_output {
            Format::Fastq
        } else if self.csv_output {
            Format::Csv
        } else if self.json_output {
            Format::Json
        } else {
            fallback
        }
    }

    /// Reverse file requested by `--paired-mode file:FILE`.
    pub fn paired_file(&self) -> anyhow::Result<Option<Option<String>>> {
        match self.paired_mode.as_deref() {
            None => Ok(None),
            Some("file") => Ok(Some(None)),
            Some(mode) => match mode.strip_prefix("file:") {
                Some(file) if !file.is_empty() => Ok(Some(Some(file.to_string()))),
                _ => anyhow::bail!("unsupported paired mode `{}`", mode),
            },
        }
    }

    pub fn writer_options(&self, ctx: &Context, format: Format) -> WriterOptions {
        let mut options = ctx.writer_options(format);
        options.append = self.append;
        options.no_order = self.no_order;
        options.skip_empty = self.skip_empty;
        if self.json_header {
            options.format_options.header_format = HeaderFormat::Json;
        }
        if let Some(shift) = self.output_quality_shift {
            options.format_options.quality_shift = shift;
        }
        if self.compress && Compression::from_extension(Path::new(&self.out)) == Compression::None {
            options.compression = Some(Compression::Gzip);
        }
        options
    }
}

/// Loads the configuration file, if any, and overlays the command line.
pub fn build_context(
    config: Option<&Path>,
    pipeline: &PipelineArgs,
    taxonomy: Option<&TaxonomyArgs>,
) -> anyhow::Result<Context> {
    let config = match config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let mut ctx = Context::from_config(&config);

    if let Some(workers) = pipeline.workers {
        ctx.workers = crate::utils::resolve_workers(workers);
        if config.pipeline.read_workers == 0 {
            ctx.read_workers = ctx.workers;
        }
    }
    if let Some(n) = pipeline.read_workers {
        ctx.read_workers = if n == 0 { ctx.workers } else { n };
    }
    if let Some(n) = pipeline.batch_size {
        anyhow::ensure!(n > 0, "--batch-size must be positive");
        ctx.batch_size = n;
    }
    if let Some(fraction) = pipeline.max_memory {
        ctx.memory_fraction = fraction;
    }
    if let Some(shift) = pipeline.input_quality_shift {
        ctx.quality_shift = shift;
    }

    if let Some(args) = taxonomy {
        ctx.fail_on_taxonomy |= args.fail_on_taxonomy;
        let path = args.taxonomy.clone().or_else(|| config.taxonomy_path());
        if let Some(path) = path {
            ctx.load_taxonomy(&path)?;
        }
    }
    if let Err(err) = crate::utils::configure_thread_pool(ctx.workers) {
        debug!("rayon pool left unchanged: {}", err);
    }
    debug!(
        "context: {} workers, {} read workers, batches of {}",
        ctx.workers, ctx.read_workers, ctx.batch_size
    );
    Ok(ctx)
}
