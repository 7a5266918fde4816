use clap::Parser;
use colored::*;
use obikit::cli::{Cli, Commands};
use obikit::ObiError;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    // OBIKIT_LOG first, then RUST_LOG, then the -v count
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("OBIKIT_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ObiError>() {
        Some(ObiError::Config(_)) => 2,
        Some(ObiError::Io(_)) => 3,
        Some(ObiError::Parse { .. }) | Some(ObiError::Format(_)) => 4,
        Some(ObiError::Taxonomy(_)) => 5,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(exit_code(&e));
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config;
    let result = match cli.command {
        Commands::Convert(args) => obikit::cli::commands::convert::run(args, config),
        Commands::Consensus(args) => obikit::cli::commands::consensus::run(args, config),
        Commands::Lca(args) => obikit::cli::commands::lca::run(args, config),
        Commands::Taxonomy(args) => obikit::cli::commands::taxonomy::run(args, config),
    };
    obikit::pipeline::wait_pipes();
    result
}
