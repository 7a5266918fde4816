use crate::cli::options::{build_context, OutputArgs, PipelineArgs, TaxonomyArgs};
use crate::formats::{read_files, read_paired, write_paired, write_sequences, Format};
use crate::pipeline::BioSequenceIter;
use anyhow::Context as _;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input files (- for stdin, |cmd for a pipe, http(s):// for a URL)
    #[arg(value_name = "INPUT", default_value = "-")]
    pub inputs: Vec<String>,

    /// Reverse reads matching the first input
    #[arg(long, value_name = "FILE")]
    pub paired_with: Option<String>,

    /// Input format, sniffed when omitted
    #[arg(long, value_name = "FORMAT")]
    pub input_format: Option<Format>,

    /// Keep only records descending from this taxon
    #[arg(long, value_name = "TAXID")]
    pub restrict_to_taxon: Option<String>,

    /// Annotate records with their ancestor at this rank
    #[arg(long, value_name = "RANK")]
    pub rank: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(flatten)]
    pub taxonomy: TaxonomyArgs,
}

pub fn run(args: ConvertArgs, config: Option<PathBuf>) -> anyhow::Result<()> {
    let needs_taxonomy = args.restrict_to_taxon.is_some() || args.rank.is_some();
    let ctx = build_context(
        config.as_deref(),
        &args.pipeline,
        needs_taxonomy.then_some(&args.taxonomy),
    )?;
    let reader = ctx.reader_options(args.input_format);

    let mut iter = match &args.paired_with {
        Some(reverse) => {
            anyhow::ensure!(args.inputs.len() == 1, "--paired-with needs exactly one input");
            read_paired(&args.inputs[0], reverse, &reader)?
        }
        None => read_files(&args.inputs, &reader)?,
    };
    let paired = iter.is_paired();
    iter = iter.limit_memory(ctx.memory_fraction);
    if args.pipeline.progress {
        iter = iter.speed("converting");
    }

    if needs_taxonomy {
        let taxonomy = Arc::clone(ctx.taxonomy()?);
        iter = taxonomy_stage(iter, taxonomy, &args, ctx.fail_on_taxonomy, ctx.workers)?;
    }

    let fallback = if paired { Format::Fastq } else { Format::Fasta };
    let format = args.output.format(fallback);
    let options = args.output.writer_options(&ctx, format);

    let written = match args.output.paired_file()? {
        Some(reverse) if paired => {
            write_paired(iter, &args.output.out, reverse.as_deref(), &options)?
        }
        Some(_) => anyhow::bail!("--paired-mode requires paired input"),
        None => write_sequences(iter, &args.output.out, &options)?,
    };
    let n = written.consume();
    info!("{} records written as {}", n, format);
    Ok(())
}

fn taxonomy_stage(
    iter: BioSequenceIter,
    taxonomy: Arc<crate::Taxonomy>,
    args: &ConvertArgs,
    strict: bool,
    workers: usize,
) -> anyhow::Result<BioSequenceIter> {
    let restrict = match &args.restrict_to_taxon {
        Some(id) => {
            let (taxon, _) = taxonomy
                .taxon(id)
                .with_context(|| format!("--restrict-to-taxon {}", id))?;
            Some(taxon.id().to_string())
        }
        None => None,
    };
    let rank = args.rank.clone();

    Ok(iter.make_worker(
        move |mut record| {
            if let Some(clade) = &restrict {
                let keep = match (record.taxon(&taxonomy), taxonomy.taxon(clade)) {
                    (Some(taxon), Ok((clade, _))) => taxon.is_subclade_of(&clade),
                    _ => false,
                };
                if !keep {
                    return Ok(Vec::new());
                }
            }
            if let Some(rank) = &rank {
                if let Err(err) = record.set_taxid_at_rank(&taxonomy, rank) {
                    if strict {
                        return Err(err);
                    }
                    tracing::warn!("{}", err);
                    record.set_attribute(format!("{}_taxid", rank), "NA");
                    record.set_attribute(format!("{}_name", rank), "NA");
                }
            }
            Ok(vec![record])
        },
        strict,
        workers,
    ))
}
