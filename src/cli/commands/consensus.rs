use crate::assembly::{consensus, ConsensusOptions};
use crate::cli::options::{build_context, OutputArgs, PipelineArgs};
use crate::formats::{read_paired, read_sequences, write_sequences, Format};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ConsensusArgs {
    /// Forward reads
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Reverse reads matching INPUT
    #[arg(long, value_name = "FILE")]
    pub paired_with: Option<String>,

    /// Forward primer
    #[arg(short = 'f', long)]
    pub forward_primer: String,

    /// Reverse primer
    #[arg(short = 'r', long)]
    pub reverse_primer: String,

    /// Build one consensus per value of this annotation
    #[arg(long, value_name = "KEY")]
    pub group_by: Option<String>,

    /// Edits allowed when locating primers
    #[arg(long, default_value_t = 2)]
    pub max_primer_errors: usize,

    /// Initial k-mer size (derived from read repeats when omitted)
    #[arg(short, long)]
    pub kmer_size: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

pub fn run(args: ConsensusArgs, config: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = build_context(config.as_deref(), &args.pipeline, None)?;
    let reader = ctx.reader_options(None);
    let mut input = match &args.paired_with {
        Some(reverse) => read_paired(&args.input, reverse, &reader)?,
        None => read_sequences(&args.input, &reader)?,
    };
    if args.pipeline.progress {
        input = input.speed("reading");
    }

    let mut options = ConsensusOptions::new(&args.forward_primer, &args.reverse_primer);
    options.max_primer_errors = args.max_primer_errors;
    options.kmer_size = args.kmer_size;

    let assembled = consensus(input, args.group_by.as_deref(), &options);
    let format = args.output.format(Format::Fasta);
    let options = args.output.writer_options(&ctx, format);
    let written = write_sequences(assembled, &args.output.out, &options)?;
    info!("{} consensus sequences written", written.consume());
    Ok(())
}
