use crate::chunker::chunk_date_range;
use crate::config::ResolvedConfig;
use crate::pipeline::state::FetchState;
use crate::source::ActivitySource;
use crate::structures::{Domain, GROUP_COLUMN, SUBGROUP_COLUMN};
use crate::writer::write_table;
use anyhow::{bail, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub domains: usize,
    pub chunks: usize,
    pub written: Vec<PathBuf>,
    pub empty: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Picks the domains named by the CLI filters. A filter matching nothing is
/// an error.
pub fn select_domains<'a>(
    config: &'a ResolvedConfig,
    domain: Option<&str>,
    group: Option<&str>,
    subgroup: Option<&str>,
) -> Result<Vec<&'a Domain>> {
    let selected: Vec<&Domain> = match (domain, group, subgroup) {
        (Some(name), _, _) => match config.domain(name) {
            Some(d) => vec![d],
            None => bail!("Domain '{}' not found in configuration", name),
        },
        (None, Some(g), Some(s)) => config
            .domains
            .iter()
            .filter(|d| d.group == g && d.subgroup.as_deref() == Some(s))
            .collect(),
        (None, Some(g), None) => config.domains.iter().filter(|d| d.group == g).collect(),
        (None, None, Some(s)) => config
            .domains
            .iter()
            .filter(|d| d.subgroup.as_deref() == Some(s))
            .collect(),
        (None, None, None) => config.domains.iter().collect(),
    };

    if selected.is_empty() {
        match (group, subgroup) {
            (Some(g), Some(s)) => bail!("No domains found in group '{}', subgroup '{}'", g, s),
            (Some(g), None) => bail!("No domains found in group '{}'", g),
            (None, Some(s)) => bail!("No domains found in subgroup '{}'", s),
            (None, None) => bail!("No domains configured"),
        }
    }
    Ok(selected)
}

/// Adds `group`/`subgroup` tag columns. Domains without a subgroup are
/// tagged with their group name in both.
fn tag_categories(df: DataFrame, domain: &Domain) -> PolarsResult<DataFrame> {
    let subgroup = domain.subgroup.as_deref().unwrap_or(&domain.group);
    df.lazy()
        .with_columns([
            lit(domain.group.as_str()).alias(GROUP_COLUMN),
            lit(subgroup).alias(SUBGROUP_COLUMN),
        ])
        .collect()
}

/// Fetches every chunk of every selected domain, one parquet file per chunk.
///
/// Failed or empty chunks are logged and the loop moves on; the state file is
/// saved after each chunk.
pub fn run_fetch(
    config: &ResolvedConfig,
    domains: &[&Domain],
    source: &dyn ActivitySource,
    state: &mut FetchState,
    state_path: &Path,
    resume: bool,
) -> Result<FetchSummary> {
    let chunks = chunk_date_range(
        config.dates.start,
        config.dates.end,
        config.settings.chunk_months,
    )?;
    let mut summary = FetchSummary {
        domains: domains.len(),
        ..Default::default()
    };

    for (i, domain) in domains.iter().enumerate() {
        let _span = tracing::info_span!("fetch_domain", domain = %domain.name).entered();
        info!(
            index = i + 1,
            total = domains.len(),
            start = %config.dates.start,
            end = %config.dates.end,
            chunks = chunks.len(),
            "fetching {}",
            domain.describe()
        );

        if let Err(e) = std::fs::create_dir_all(&domain.output.dir) {
            warn!(dir=?domain.output.dir, error=%e, "cannot create output directory; skipping domain");
            summary.chunks += chunks.len();
            summary.failed += chunks.len();
            for chunk in &chunks {
                let reason = format!("cannot create {:?}: {}", domain.output.dir, e);
                state.record_failure(&domain.name, *chunk, reason);
            }
            if let Err(e) = state.save(state_path) {
                warn!(state_path=?state_path, error=%format!("{:#}", e), "failed to save fetch state");
            }
            continue;
        }

        for (n, chunk) in chunks.iter().enumerate() {
            summary.chunks += 1;
            let path = domain.chunk_file(chunk);
            if resume && state.is_completed(&domain.name, chunk) && path.exists() {
                info!(%chunk, "already fetched; skipping");
                summary.skipped += 1;
                continue;
            }

            let t_chunk = Instant::now();
            info!(
                chunk = n + 1,
                of = chunks.len(),
                start = %chunk.start,
                end = %chunk.end,
                "processing chunk"
            );
            let fetched = source
                .fetch(&domain.name, chunk.start, chunk.end)
                .and_then(|rows| match rows {
                    Some(df) => Ok(Some(tag_categories(df, domain)?)),
                    None => Ok(None),
                });

            match fetched {
                Ok(Some(mut df)) => match write_table(&path, &mut df) {
                    Ok(()) => {
                        info!(
                            path=?path,
                            rows=df.height(),
                            duration_s=t_chunk.elapsed().as_secs_f32(),
                            "chunk saved"
                        );
                        state.record_success(&domain.name, *chunk);
                        summary.written.push(path);
                    }
                    Err(e) => {
                        warn!(path=?path, error=%format!("{:#}", e), "failed to write chunk");
                        state.record_failure(&domain.name, *chunk, format!("{:#}", e));
                        summary.failed += 1;
                    }
                },
                Ok(None) => {
                    info!(%chunk, "no data returned");
                    summary.empty += 1;
                }
                Err(e) => {
                    warn!(%chunk, error=%format!("{:#}", e), "fetch failed; continuing");
                    state.record_failure(&domain.name, *chunk, format!("{:#}", e));
                    summary.failed += 1;
                }
            }

            if let Err(e) = state.save(state_path) {
                warn!(state_path=?state_path, error=%format!("{:#}", e), "failed to save fetch state");
            }
        }
    }

    info!(
        domains = summary.domains,
        chunks = summary.chunks,
        written = summary.written.len(),
        empty = summary.empty,
        failed = summary.failed,
        skipped = summary.skipped,
        "data fetching phase complete"
    );
    Ok(summary)
}
