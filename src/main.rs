mod analysis;
mod chunker;
mod cli;
mod collector;
mod config;
mod inspect;
mod loader;
mod pipeline;
mod schema;
mod source;
mod structures;
mod writer;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            pipeline::run_pipeline(args)?;
        }
        Commands::Fetch(cmd) => {
            pipeline::run_fetch_only(&cmd.config, cmd.args)?;
        }
        Commands::Combine(cmd) => {
            pipeline::run_combine_only(&cmd.config, cmd.args)?;
        }
        Commands::Chunks(args) => {
            inspect::run_chunks(args)?;
        }
        Commands::Check(args) => {
            inspect::run_check(args)?;
        }
        Commands::Analyze(args) => {
            analysis::run_analyze(args)?;
        }
        Commands::Status(args) => {
            pipeline::status::run_status(args)?;
        }
    }

    Ok(())
}
