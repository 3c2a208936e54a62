use crate::chunker::chunk_date_range;
use crate::cli::StatusArgs;
use crate::config::{load_config, ResolvedConfig};
use crate::pipeline::state::{FetchState, STATE_FILE};
use anyhow::Result;
use colored::Colorize;
use tracing::{info, warn};

/// Per-domain completed/planned counts, missing chunks and last errors.
pub fn render_status(config: &ResolvedConfig, state: &FetchState) -> Result<String> {
    let plan = chunk_date_range(
        config.dates.start,
        config.dates.end,
        config.settings.chunk_months,
    )?;

    let mut out = String::new();
    let mut done_domains = 0;
    for domain in &config.domains {
        let progress = state.progress(&domain.name, &plan);
        let counts = format!("{}/{}", progress.completed, progress.planned);
        let counts = if progress.is_done() {
            done_domains += 1;
            counts.green()
        } else if progress.completed == 0 {
            counts.red()
        } else {
            counts.yellow()
        };
        out.push_str(&format!("{} {}\n", domain.name.bold(), counts));

        for chunk in &progress.missing {
            match progress.failed.iter().find(|f| f.chunk == *chunk) {
                Some(f) => out.push_str(&format!(
                    "  missing {} (failed {}x: {})\n",
                    chunk, f.attempts, f.error
                )),
                None => out.push_str(&format!("  missing {}\n", chunk)),
            }
        }
        if progress.outside_plan > 0 {
            out.push_str(&format!(
                "  {}\n",
                format!("{} fetched chunks outside the current plan", progress.outside_plan).dimmed()
            ));
        }
    }

    for name in state.domains() {
        if config.domain(name).is_none() {
            out.push_str(&format!("{} {}\n", name, "(not in configuration)".dimmed()));
        }
    }
    out.push_str(&format!(
        "\n{}/{} domains complete, {} chunks per domain\n",
        done_domains,
        config.domains.len(),
        plan.len()
    ));
    Ok(out)
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let state_path = args.state_dir.join(STATE_FILE);
    if !state_path.exists() {
        warn!(state_path=?state_path, "no fetch state found; nothing fetched yet");
    }
    let state = FetchState::load(&state_path)?;

    info!(
        started_at=%state.started_at,
        updated_at=%state.updated_at,
        completed_chunks=state.completed_count(),
        failed_chunks=state.failed_count(),
        "fetch state"
    );
    print!("{}", render_status(&config, &state)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::DateChunk;
    use crate::config::parse_config;
    use chrono::NaiveDate;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, day).unwrap()
    }

    #[test]
    fn reports_progress_and_missing_chunks_per_domain() {
        colored::control::set_override(false);
        let config = parse_config(
            r#"
dates: {start_date: "2023-01-01", end_date: "2023-06-30"}
domains:
  - {name: graphext.com, group: work}
  - {name: github.com, group: work}
groups:
  - {name: work, output_dir: w, output_file: w.parquet}
settings: {chunk_months: 3}
"#,
        )
        .unwrap();
        let first = DateChunk { start: d(1, 1), end: d(4, 1) };
        let second = DateChunk { start: d(4, 2), end: d(6, 30) };

        let mut state = FetchState::new();
        state.record_success("graphext.com", first);
        state.record_success("graphext.com", second);
        state.record_success("github.com", first);
        state.record_failure("github.com", second, "HTTP 502".into());
        state.record_failure("gone.com", first, "HTTP 404".into());

        let text = render_status(&config, &state).unwrap();
        assert!(text.contains("graphext.com 2/2\n"));
        assert!(text.contains("github.com 1/2\n"));
        assert!(text.contains("  missing 2023-04-02 to 2023-06-30 (failed 1x: HTTP 502)\n"));
        assert!(!text.contains("missing 2023-01-01"));
        assert!(text.contains("gone.com (not in configuration)"));
        assert!(text.contains("1/2 domains complete, 2 chunks per domain"));
    }
}
