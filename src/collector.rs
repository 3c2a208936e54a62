use crate::config::ResolvedConfig;
use crate::structures::{Domain, TABLE_EXTENSION};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

/// Locates the raw chunk files of a set of domains.
///
/// Aggregate outputs live in the same directories as raw chunk files, so
/// stale aggregates are deleted before scanning and known aggregate paths are
/// never returned as raw input. Outputs written earlier in the current run
/// are left untouched.
#[derive(Debug, Default)]
pub struct FileCollector {
    aggregate_outputs: HashSet<PathBuf>,
    written: HashSet<PathBuf>,
}

impl FileCollector {
    pub fn new(aggregate_outputs: HashSet<PathBuf>) -> Self {
        Self {
            aggregate_outputs,
            written: HashSet::new(),
        }
    }

    pub fn for_config(config: &ResolvedConfig) -> Self {
        Self::new(config.aggregate_outputs())
    }

    /// Records an aggregate produced in this run so later stages keep it.
    pub fn mark_written(&mut self, path: &Path) {
        self.written.insert(path.to_path_buf());
    }

    pub fn collect(&self, domains: &[&Domain]) -> Vec<PathBuf> {
        self.remove_stale_outputs(domains);

        let mut all_files = Vec::new();
        for domain in domains {
            let dir = &domain.output.dir;
            if !dir.is_dir() {
                warn!(domain=%domain.name, dir=?dir, "directory for domain does not exist; skipping");
                continue;
            }
            match self.domain_files(domain) {
                Ok(files) => all_files.extend(files),
                Err(e) => {
                    warn!(domain=%domain.name, dir=?dir, error=%format!("{:#}", e), "failed to list domain files; skipping");
                }
            }
        }
        all_files
    }

    fn remove_stale_outputs(&self, domains: &[&Domain]) {
        let targets: HashSet<PathBuf> = domains.iter().map(|d| d.output.path()).collect();
        for target in targets {
            if self.written.contains(&target) || !target.exists() {
                continue;
            }
            match std::fs::remove_file(&target) {
                Ok(()) => info!(path=?target, "removed previous combined file"),
                Err(e) => warn!(path=?target, error=%e, "could not remove previous combined file"),
            }
        }
    }

    fn domain_files(&self, domain: &Domain) -> Result<Vec<PathBuf>> {
        let dir = &domain.output.dir;
        let prefix = format!("{}_", domain.file_prefix);

        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
            let entry = entry?;
            let path = entry.path();
            let matches_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == TABLE_EXTENSION);
            if !matches_name || !matches_ext || !path.is_file() {
                continue;
            }
            if self.aggregate_outputs.contains(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }

        // Newest first. Only affects logging; the merge is a union of all rows.
        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        if let Some((newest, modified)) = files.first() {
            let modified: DateTime<Local> = (*modified).into();
            info!(
                domain=%domain.name,
                files=files.len(),
                newest=?newest,
                modified=%modified.format("%Y-%m-%d %H:%M:%S"),
                "found domain files"
            );
        }
        Ok(files.into_iter().map(|(p, _)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::OutputTarget;
    use tempfile::TempDir;

    fn domain(name: &str, prefix: &str, dir: &Path, file: &str) -> Domain {
        Domain {
            name: name.into(),
            group: "work".into(),
            subgroup: None,
            file_prefix: prefix.into(),
            output: OutputTarget::new(dir, file),
        }
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn matches_prefix_and_extension_only() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("graphext_2023-01-01_to_2023-03-31.parquet"));
        touch(&dir.path().join("graphext_2023-04-01_to_2023-06-30.parquet"));
        touch(&dir.path().join("graphext_notes.txt"));
        touch(&dir.path().join("graphextra_2023.parquet"));
        touch(&dir.path().join("github_2023-01-01_to_2023-03-31.parquet"));

        let d = domain("graphext.com", "graphext", dir.path(), "work.parquet");
        let files = FileCollector::default().collect(&[&d]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("graphext_")));
    }

    #[test]
    fn missing_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("github_2023.parquet"));
        let missing = domain("gone.com", "gone", &dir.path().join("nope"), "x.parquet");
        let present = domain("github.com", "github", dir.path(), "x.parquet");
        let files = FileCollector::default().collect(&[&missing, &present]);
        assert_eq!(files, vec![dir.path().join("github_2023.parquet")]);
    }

    #[test]
    fn stale_aggregate_is_deleted_before_scanning() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("graphext_2023-01-01_to_2023-03-31.parquet"));
        // An aggregate whose name collides with the raw file pattern.
        let stale = dir.path().join("graphext_combined.parquet");
        touch(&stale);

        let d = domain("graphext.com", "graphext", dir.path(), "graphext_combined.parquet");
        let files = FileCollector::default().collect(&[&d]);
        assert!(!stale.exists());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn outputs_written_this_run_are_kept_but_not_collected() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("graphext_2023-01-01_to_2023-03-31.parquet"));
        let fresh = dir.path().join("graphext_combined.parquet");
        touch(&fresh);

        let d = domain("graphext.com", "graphext", dir.path(), "graphext_combined.parquet");
        let mut collector = FileCollector::new(HashSet::from([fresh.clone()]));
        collector.mark_written(&fresh);
        let files = collector.collect(&[&d]);
        assert!(fresh.exists());
        assert_eq!(
            files,
            vec![dir.path().join("graphext_2023-01-01_to_2023-03-31.parquet")]
        );
    }

    #[test]
    fn files_from_every_domain_are_concatenated() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("graphext_a.parquet"));
        touch(&dir.path().join("github_a.parquet"));
        touch(&dir.path().join("github_b.parquet"));
        let a = domain("graphext.com", "graphext", dir.path(), "work.parquet");
        let b = domain("github.com", "github", dir.path(), "work.parquet");
        let files = FileCollector::default().collect(&[&a, &b]);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], dir.path().join("graphext_a.parquet"));
    }
}
