pub mod aggregate;
pub mod combine;
pub mod fetch;
pub mod state;
pub mod status;

use crate::cli::{CombineArgs, FetchArgs, RunArgs};
use crate::config::{load_config, ResolvedConfig};
use crate::pipeline::combine::{run_combine, CombineOptions, CombineReport};
use crate::pipeline::fetch::{run_fetch, select_domains, FetchSummary};
use crate::pipeline::state::{FetchState, STATE_FILE};
use crate::source::RescueTimeClient;
use anyhow::Result;
use std::path::Path;
use std::time::Instant;
use tracing::info;

fn load(config_path: &Path) -> Result<ResolvedConfig> {
    info!(config=?config_path, "loading configuration");
    let config = load_config(config_path)?;

    let groups = config.top_level_groups().count();
    let subgroups = config.subgroups().count();
    info!(
        domains = config.domains.len(),
        groups,
        subgroups,
        start = %config.dates.start,
        end = %config.dates.end,
        "pipeline configured"
    );
    Ok(config)
}

fn fetch_phase(config: &ResolvedConfig, args: &FetchArgs) -> Result<FetchSummary> {
    info!("starting data fetching phase");
    // Filters are checked before the API key so a typo fails fast.
    let domains = select_domains(
        config,
        args.filter.domain.as_deref(),
        args.filter.group.as_deref(),
        args.filter.subgroup.as_deref(),
    )?;
    let source = RescueTimeClient::from_env(config.settings.detailed_data)?;

    let state_path = args.state_dir.join(STATE_FILE);
    let mut state = if args.resume {
        FetchState::load(&state_path)?
    } else {
        FetchState::new()
    };
    run_fetch(
        config,
        &domains,
        &source,
        &mut state,
        &state_path,
        args.resume,
    )
}

fn combine_phase(config: &ResolvedConfig, args: &CombineArgs) -> CombineReport {
    info!("starting data combination phase");
    run_combine(
        config,
        CombineOptions {
            skip_subgroups: args.skip_subgroups,
            skip_groups: args.skip_groups,
            skip_all: args.skip_all,
        },
    )
}

pub fn run_pipeline(args: RunArgs) -> Result<()> {
    let started = Instant::now();
    let config = load(&args.config)?;

    if args.skip_fetch {
        info!("skipping data fetching phase");
    } else {
        fetch_phase(&config, &args.fetch)?;
    }

    if args.skip_combine {
        info!("skipping data combination phase");
    } else {
        combine_phase(&config, &args.combine);
    }

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        elapsed_s = %format!("{:.2}", elapsed),
        elapsed_min = %format!("{:.2}", elapsed / 60.0),
        "pipeline complete"
    );
    Ok(())
}

pub fn run_fetch_only(config_path: &Path, args: FetchArgs) -> Result<()> {
    let config = load(config_path)?;
    let summary = fetch_phase(&config, &args)?;
    if !summary.written.is_empty() {
        info!("to combine files by group and subgroup, run the 'combine' command");
    }
    Ok(())
}

pub fn run_combine_only(config_path: &Path, args: CombineArgs) -> Result<()> {
    let config = load(config_path)?;
    combine_phase(&config, &args);
    Ok(())
}
