use crate::chunker::DateChunk;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;

/// Name of the reserved node aggregating every domain.
pub const ALL_NODE: &str = "all";
pub const DEFAULT_ALL_OUTPUT_DIR: &str = "rescuetime_data";
pub const DEFAULT_ALL_OUTPUT_FILE: &str = "all_domains_history.parquet";

pub const TABLE_EXTENSION: &str = "parquet";

/// RescueTime column names the summary works on.
pub const DATE_COLUMN: &str = "Date";
pub const SECONDS_COLUMN: &str = "Time Spent (seconds)";
pub const GROUP_COLUMN: &str = "group";
pub const SUBGROUP_COLUMN: &str = "subgroup";

/// Directory + file name an aggregation node writes its merged table to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub file: String,
}

impl OutputTarget {
    pub fn new(dir: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file: file.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

/// Top-level aggregation bucket. Only groups can have children.
#[derive(Debug, Clone, Serialize)]
pub struct GroupNode {
    pub name: String,
    pub output: OutputTarget,
    pub children: Vec<String>,
}

/// Second-level bucket. `parent` always names a [`GroupNode`].
#[derive(Debug, Clone, Serialize)]
pub struct SubgroupNode {
    pub name: String,
    pub output: OutputTarget,
    pub parent: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HierarchyNode {
    Group(GroupNode),
    Subgroup(SubgroupNode),
}

impl HierarchyNode {
    pub fn name(&self) -> &str {
        match self {
            HierarchyNode::Group(g) => &g.name,
            HierarchyNode::Subgroup(s) => &s.name,
        }
    }

    pub fn output(&self) -> &OutputTarget {
        match self {
            HierarchyNode::Group(g) => &g.output,
            HierarchyNode::Subgroup(s) => &s.output,
        }
    }

    pub fn is_subgroup(&self) -> bool {
        matches!(self, HierarchyNode::Subgroup(_))
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            HierarchyNode::Group(_) => None,
            HierarchyNode::Subgroup(s) => Some(&s.parent),
        }
    }

    pub fn children(&self) -> &[String] {
        match self {
            HierarchyNode::Group(g) => &g.children,
            HierarchyNode::Subgroup(_) => &[],
        }
    }
}

/// One tracked target. Immutable once resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Domain {
    pub name: String,
    pub group: String,
    pub subgroup: Option<String>,
    /// Leading part of every raw chunk file name for this domain.
    pub file_prefix: String,
    /// Inherited from the subgroup if set, else from the group.
    pub output: OutputTarget,
}

impl Domain {
    /// Default prefix: the text before the first `.` of the domain name.
    pub fn default_prefix(name: &str) -> String {
        name.split('.').next().unwrap_or(name).to_string()
    }

    pub fn chunk_file(&self, chunk: &DateChunk) -> PathBuf {
        self.output.dir.join(format!(
            "{}_{}_to_{}.{}",
            self.file_prefix, chunk.start, chunk.end, TABLE_EXTENSION
        ))
    }

    pub fn describe(&self) -> String {
        match &self.subgroup {
            Some(sub) => format!(
                "domain '{}' (group: {}, subgroup: {})",
                self.name, self.group, sub
            ),
            None => format!("domain '{}' (group: {})", self.name, self.group),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub chunk_months: u32,
    /// Request hourly resolution from the API.
    pub detailed_data: bool,
    pub combine_all: bool,
    pub combine_by_group: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_months: 3,
            detailed_data: true,
            combine_all: true,
            combine_by_group: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefix_stops_at_first_dot() {
        assert_eq!(Domain::default_prefix("graphext.com"), "graphext");
        assert_eq!(Domain::default_prefix("docs.rs.io"), "docs");
        assert_eq!(Domain::default_prefix("localhost"), "localhost");
    }

    #[test]
    fn chunk_file_uses_prefix_and_dates() {
        let domain = Domain {
            name: "graphext.com".into(),
            group: "work".into(),
            subgroup: None,
            file_prefix: "graphext".into(),
            output: OutputTarget::new("data/work", "work.parquet"),
        };
        let chunk = DateChunk {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 4, 1).unwrap(),
        };
        assert_eq!(
            domain.chunk_file(&chunk),
            PathBuf::from("data/work/graphext_2023-01-01_to_2023-04-01.parquet")
        );
    }

    #[test]
    fn subgroup_has_no_children() {
        let node = HierarchyNode::Subgroup(SubgroupNode {
            name: "clients".into(),
            output: OutputTarget::new("d", "f.parquet"),
            parent: "work".into(),
        });
        assert!(node.is_subgroup());
        assert_eq!(node.parent(), Some("work"));
        assert!(node.children().is_empty());
    }
}
