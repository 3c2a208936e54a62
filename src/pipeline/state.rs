use crate::chunker::DateChunk;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const STATE_FILE: &str = "fetch_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedChunk {
    #[serde(flatten)]
    pub chunk: DateChunk,
    pub error: String,
    pub attempts: u32,
}

/// Fetch progress keyed by domain name, persisted between runs for `--resume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchState {
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    completed: BTreeMap<String, BTreeSet<DateChunk>>,
    failed: BTreeMap<String, Vec<FailedChunk>>,
}

/// Completion of one domain measured against the current chunk plan.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainProgress {
    pub planned: usize,
    pub completed: usize,
    /// Planned chunks not fetched yet, in plan order.
    pub missing: Vec<DateChunk>,
    pub failed: Vec<FailedChunk>,
    /// Completed chunks that are not part of the plan (the date range or
    /// chunk size changed since they were fetched).
    pub outside_plan: usize,
}

impl DomainProgress {
    pub fn is_done(&self) -> bool {
        self.missing.is_empty()
    }
}

impl Default for FetchState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            updated_at: now,
            completed: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

impl FetchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing file means nothing was fetched yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fetch state {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse fetch state {:?}", path))
    }

    /// Writes through a temporary file so an interrupted run leaves the
    /// previous state intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create state directory {:?}", parent))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, text).with_context(|| format!("Failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
        Ok(())
    }

    pub fn record_success(&mut self, domain: &str, chunk: DateChunk) {
        self.updated_at = Utc::now();
        self.completed
            .entry(domain.to_string())
            .or_default()
            .insert(chunk);
        if let Some(failures) = self.failed.get_mut(domain) {
            failures.retain(|f| f.chunk != chunk);
            if failures.is_empty() {
                self.failed.remove(domain);
            }
        }
    }

    /// Keeps the latest error of each chunk and counts attempts.
    pub fn record_failure(&mut self, domain: &str, chunk: DateChunk, error: String) {
        self.updated_at = Utc::now();
        if let Some(done) = self.completed.get_mut(domain) {
            done.remove(&chunk);
        }
        let failures = self.failed.entry(domain.to_string()).or_default();
        match failures.iter_mut().find(|f| f.chunk == chunk) {
            Some(existing) => {
                existing.error = error;
                existing.attempts += 1;
            }
            None => failures.push(FailedChunk {
                chunk,
                error,
                attempts: 1,
            }),
        }
    }

    pub fn is_completed(&self, domain: &str, chunk: &DateChunk) -> bool {
        self.completed
            .get(domain)
            .is_some_and(|done| done.contains(chunk))
    }

    pub fn completed_count(&self) -> usize {
        self.completed.values().map(BTreeSet::len).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.values().map(Vec::len).sum()
    }

    /// Domains with recorded activity, for spotting ones no longer configured.
    pub fn domains(&self) -> BTreeSet<&str> {
        self.completed
            .keys()
            .chain(self.failed.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn progress(&self, domain: &str, plan: &[DateChunk]) -> DomainProgress {
        let empty = BTreeSet::new();
        let done = self.completed.get(domain).unwrap_or(&empty);
        let missing: Vec<DateChunk> = plan.iter().filter(|c| !done.contains(*c)).copied().collect();
        let outside_plan = done.iter().filter(|c| !plan.contains(*c)).count();
        DomainProgress {
            planned: plan.len(),
            completed: plan.len() - missing.len(),
            missing,
            failed: self.failed.get(domain).cloned().unwrap_or_default(),
            outside_plan,
        }
    }
}
