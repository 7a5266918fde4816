use crate::cli::options::{build_context, PipelineArgs, TaxonomyArgs};
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TaxonomyCommandArgs {
    #[command(subcommand)]
    pub command: TaxonomyCommands,

    #[command(flatten)]
    pub taxonomy: TaxonomyArgs,
}

#[derive(Subcommand, Debug)]
pub enum TaxonomyCommands {
    /// Print the lineage of taxa, root first
    Path {
        #[arg(value_name = "TAXID", required = true)]
        taxids: Vec<String>,
    },

    /// Print the ancestor of taxa at a rank
    Rank {
        #[arg(short, long)]
        rank: String,

        #[arg(value_name = "TAXID", required = true)]
        taxids: Vec<String>,
    },

    /// List the ranks of the taxonomy
    Ranks,
}

pub fn run(args: TaxonomyCommandArgs, config: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = build_context(config.as_deref(), &PipelineArgs::default(), Some(&args.taxonomy))?;
    let taxonomy = ctx.taxonomy()?;

    match &args.command {
        TaxonomyCommands::Path { taxids } => {
            for id in taxids {
                let (taxon, alias) = taxonomy.taxon(id)?;
                if alias {
                    eprintln!("{} {} is an alias of {}", "Note:".yellow(), id, taxon.id());
                }
                for (depth, ancestor) in taxon.path().iter().enumerate() {
                    println!("{}{}", "  ".repeat(depth), ancestor);
                }
            }
        }
        TaxonomyCommands::Rank { rank, taxids } => {
            anyhow::ensure!(
                taxonomy.rank_index(rank).is_some(),
                "rank `{}` does not occur in taxonomy {}",
                rank,
                taxonomy.name()
            );
            for id in taxids {
                let (taxon, _) = taxonomy.taxon(id)?;
                let answer = taxon
                    .taxon_at_rank(rank)
                    .map_or_else(|| "NA".to_string(), |t| t.string());
                println!("{}\t{}", taxon, answer);
            }
        }
        TaxonomyCommands::Ranks => {
            for rank in taxonomy.ranks() {
                println!("{}\t{}", rank, taxonomy.taxa_at_rank(rank).len());
            }
        }
    }
    Ok(())
}
