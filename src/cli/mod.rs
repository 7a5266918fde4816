pub mod commands;
pub mod options;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "obikit",
    version,
    about = "Streaming toolkit for DNA metabarcoding reads",
    long_about = "obikit streams sequence records through parallel stages: format \
                  conversion, amplicon consensus by micro-assembly, and taxonomic \
                  LCA assignment."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert sequence files between formats
    Convert(commands::convert::ConvertArgs),

    /// Assemble amplicon consensus sequences from paired reads
    Consensus(commands::consensus::ConsensusArgs),

    /// Weighted lowest common ancestor of taxid observations
    Lca(commands::lca::LcaArgs),

    /// Query a taxonomy
    Taxonomy(commands::taxonomy::TaxonomyCommandArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "obikit",
            "convert",
            "reads.fastq",
            "--fasta-output",
            "-o",
            "out.fasta.gz",
            "--workers",
            "2",
        ])
        .unwrap();
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.inputs, vec!["reads.fastq".to_string()]);
        assert_eq!(args.output.out, "out.fasta.gz");
        assert_eq!(args.pipeline.workers, Some(2));
        assert!(args.output.fasta_output);
    }

    #[test]
    fn test_exclusive_output_formats() {
        let args = ["obikit", "convert", "--fasta-output", "--json-output"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
