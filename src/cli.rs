use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rescuetime-rollup")]
#[command(about = "Fetch RescueTime activity in chunks and roll it up by group", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: fetch every chunk, then combine by hierarchy
    Run(RunArgs),
    /// Fetch data only
    Fetch(FetchCommand),
    /// Combine already fetched files only
    Combine(CombineCommand),
    /// Print the date chunks a fetch would request
    Chunks(ChunksArgs),
    /// Validate the configuration and print the resolved hierarchy
    Check(CheckArgs),
    /// Summarize a parquet file and optionally write reports
    Analyze(AnalyzeArgs),
    /// Show per-domain fetch progress against the chunk plan
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub fetch: FetchArgs,

    #[command(flatten)]
    pub combine: CombineArgs,

    /// Skip the data fetching phase
    #[arg(long, default_value_t = false)]
    pub skip_fetch: bool,

    /// Skip the data combination phase
    #[arg(long, default_value_t = false)]
    pub skip_combine: bool,
}

#[derive(Args, Debug, Default)]
pub struct DomainFilter {
    /// Process only this domain
    #[arg(long)]
    pub domain: Option<String>,

    /// Process only domains in this group
    #[arg(long)]
    pub group: Option<String>,

    /// Process only domains in this subgroup
    #[arg(long)]
    pub subgroup: Option<String>,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub filter: DomainFilter,

    /// Skip chunks already fetched by a previous run
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Directory holding fetch_state.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct CombineArgs {
    /// Skip combining data by subgroups
    #[arg(long, default_value_t = false)]
    pub skip_subgroups: bool,

    /// Skip combining data by main groups
    #[arg(long, default_value_t = false)]
    pub skip_groups: bool,

    /// Skip combining all domains together
    #[arg(long, default_value_t = false)]
    pub skip_all: bool,
}

#[derive(Args, Debug)]
pub struct FetchCommand {
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub args: FetchArgs,
}

#[derive(Args, Debug)]
pub struct CombineCommand {
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub args: CombineArgs,
}

#[derive(Args, Debug)]
pub struct ChunksArgs {
    /// Used for any value not given on the command line
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Months per chunk
    #[arg(long)]
    pub months: Option<u32>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Parquet file to summarize (usually a combined output)
    #[arg(long)]
    pub input: PathBuf,

    /// Write a Markdown report here
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write the summary as JSON here
    #[arg(long)]
    pub json: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Provides the domains and the chunk plan
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    /// Directory containing fetch_state.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,
}
