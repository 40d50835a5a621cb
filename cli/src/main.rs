//! CLI for Tally
//!
//! Developer front-end for the counter query library:
//! - list: Enumerate the metric catalog
//! - plan: Show pass count and result buffer layout for a request
//! - emit: Dump the Begin/End command streams of a request
//! - reduce: Compute metric values from a captured result slot

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - GPU hardware counter queries", long_about = None)]
#[command(version)]
struct Cli {
    /// Device configuration file (TOML or JSON); TALLY_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available metrics
    List(commands::list::ListArgs),

    /// Plan a query pool and print its result layout
    Plan(commands::plan::PlanArgs),

    /// Dump the command streams of a query pool
    Emit(commands::emit::EmitArgs),

    /// Compute metric values from a capture file
    Reduce(commands::reduce::ReduceArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::List(args) => commands::list::run(args, config),
        Commands::Plan(args) => commands::plan::run(args, config),
        Commands::Emit(args) => commands::emit::run(args, config),
        Commands::Reduce(args) => commands::reduce::run(args, config),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
