use crate::analysis::{log_summary, summarize, SummaryOutcome};
use crate::collector::FileCollector;
use crate::config::ResolvedConfig;
use crate::pipeline::aggregate::aggregate_files;
use crate::structures::{Domain, HierarchyNode};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct CombineOptions {
    pub skip_subgroups: bool,
    pub skip_groups: bool,
    pub skip_all: bool,
}

#[derive(Debug, Default)]
pub struct CombineReport {
    /// Raw files read, counted once per node that consumed them.
    pub files_combined: usize,
    pub outputs: Vec<PathBuf>,
    pub summaries: Vec<(String, SummaryOutcome)>,
}

/// Merges raw chunk files into one output per hierarchy node: subgroups,
/// then top-level groups, then `all`.
pub fn run_combine(config: &ResolvedConfig, options: CombineOptions) -> CombineReport {
    let mut collector = FileCollector::for_config(config);
    let mut report = CombineReport::default();

    if options.skip_subgroups {
        info!("skipping subgroup combination");
    } else {
        for node in config.subgroups() {
            let domains = config.domains_in_subgroup(node.name());
            combine_node(&mut collector, node, &domains, "subgroup", &mut report);
        }
    }

    if !config.settings.combine_by_group {
        info!("combine_by_group disabled; skipping group combination");
    } else if options.skip_groups {
        info!("skipping group combination");
    } else {
        for node in config.top_level_groups() {
            let domains = config.domains_in_group(node.name());
            combine_node(&mut collector, node, &domains, "group", &mut report);
        }
    }

    if !config.settings.combine_all {
        info!("combine_all disabled; skipping all-domains combination");
    } else if options.skip_all {
        info!("skipping all-domains combination");
    } else {
        match config.all_node() {
            Some(node) => {
                let domains: Vec<&Domain> = config.domains.iter().collect();
                combine_node(&mut collector, node, &domains, "all domains", &mut report);
            }
            None => warn!("'all' group not found in configuration; skipping all-domains combination"),
        }
    }

    info!(
        files_combined = report.files_combined,
        outputs = report.outputs.len(),
        "data combination phase complete"
    );
    for output in &report.outputs {
        info!(output=?output, "combined output");
    }
    report
}

fn combine_node(
    collector: &mut FileCollector,
    node: &HierarchyNode,
    domains: &[&Domain],
    kind: &str,
    report: &mut CombineReport,
) {
    let name = node.name();
    let _span = tracing::info_span!("combine", node = %name, kind = %kind).entered();

    if domains.is_empty() {
        info!("no domains found; skipping");
        return;
    }

    let files = collector.collect(domains);
    if files.is_empty() {
        info!("no parquet files found; skipping");
        return;
    }

    let output = node.output().path();
    info!(files = files.len(), output=?output, "combining files");
    match aggregate_files(&files, &output) {
        Ok(outcome) => {
            if outcome.table.is_some() {
                collector.mark_written(&output);
                report.files_combined += files.len();
                report.outputs.push(output);
            }
            let summary = summarize(outcome.table.as_ref());
            let names: Vec<&str> = domains.iter().map(|d| d.name.as_str()).collect();
            log_summary(&summary, name, &names);
            report.summaries.push((name.to_string(), summary));
        }
        Err(e) => {
            error!(output=?output, error=%format!("{:#}", e), "failed to combine files");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::loader::read_table;
    use crate::writer::write_table;
    use polars::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(root: &Path, extra_settings: &str) -> ResolvedConfig {
        let text = format!(
            r#"
dates:
  start_date: "2023-01-01"
  end_date: "2023-06-30"
domains:
  - name: graphext.com
    group: work
    subgroup: clients
  - name: github.com
    group: work
  - name: youtube.com
    group: leisure
groups:
  - name: work
    output_dir: {root}/work
    output_file: work_all.parquet
  - name: clients
    output_dir: {root}/clients
    output_file: clients_all.parquet
    parent: work
  - name: leisure
    output_dir: {root}/leisure
    output_file: leisure_all.parquet
  - name: all
    output_dir: {root}
    output_file: everything.parquet
settings:
  chunk_months: 3
{extra_settings}"#,
            root = root.display(),
        );
        parse_config(&text).unwrap()
    }

    fn raw(path: PathBuf, rows: usize) {
        let dates: Vec<&str> = vec!["2023-01-01"; rows];
        let seconds: Vec<i64> = vec![60; rows];
        let mut df = df!("Date" => dates, "Time Spent (seconds)" => seconds).unwrap();
        write_table(&path, &mut df).unwrap();
    }

    fn seed(root: &Path) {
        raw(root.join("clients/graphext_2023-01-01_to_2023-04-01.parquet"), 2);
        raw(root.join("clients/graphext_2023-04-02_to_2023-06-30.parquet"), 3);
        raw(root.join("work/github_2023-01-01_to_2023-04-01.parquet"), 4);
        raw(root.join("leisure/youtube_2023-01-01_to_2023-04-01.parquet"), 1);
    }

    fn height(path: PathBuf) -> usize {
        read_table(&path).unwrap().height()
    }

    #[test]
    fn produces_one_output_per_node() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let config = config(dir.path(), "");
        let report = run_combine(&config, CombineOptions::default());

        assert_eq!(report.outputs.len(), 4);
        assert_eq!(height(dir.path().join("clients/clients_all.parquet")), 5);
        assert_eq!(height(dir.path().join("work/work_all.parquet")), 9);
        assert_eq!(height(dir.path().join("leisure/leisure_all.parquet")), 1);
        assert_eq!(height(dir.path().join("everything.parquet")), 10);
        // subgroup, work, leisure, all
        assert_eq!(report.files_combined, 2 + 3 + 1 + 4);
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let config = config(dir.path(), "");
        run_combine(&config, CombineOptions::default());
        let report = run_combine(&config, CombineOptions::default());

        assert_eq!(report.outputs.len(), 4);
        assert_eq!(height(dir.path().join("work/work_all.parquet")), 9);
        assert_eq!(height(dir.path().join("everything.parquet")), 10);
    }

    #[test]
    fn skip_flags_and_settings_are_honored() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());
        let config = config(dir.path(), "  combine_by_group: false\n");
        let report = run_combine(
            &config,
            CombineOptions {
                skip_all: true,
                ..Default::default()
            },
        );
        assert_eq!(report.outputs, vec![dir.path().join("clients/clients_all.parquet")]);
        assert!(!dir.path().join("work/work_all.parquet").exists());
        assert!(!dir.path().join("everything.parquet").exists());
    }

    #[test]
    fn nodes_without_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path(), "");
        let report = run_combine(&config, CombineOptions::default());
        assert!(report.outputs.is_empty());
        assert_eq!(report.files_combined, 0);
    }
}
