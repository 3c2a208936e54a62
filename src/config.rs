use crate::structures::{
    DateRange, Domain, GroupNode, HierarchyNode, OutputTarget, Settings, SubgroupNode, ALL_NODE,
    DEFAULT_ALL_OUTPUT_DIR, DEFAULT_ALL_OUTPUT_FILE,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const REQUIRED_SECTIONS: [&str; 3] = ["dates", "domains", "groups"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fatal configuration problems. Any of these aborts the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("required section '{0}' not found in configuration file")]
    MissingSection(&'static str),

    #[error("missing '{0}' in the 'dates' section")]
    MissingDate(&'static str),

    #[error("'{key}' must be in YYYY-MM-DD format (got '{value}')")]
    BadDateFormat { key: &'static str, value: String },

    #[error("start_date {start} is after end_date {end}")]
    DateOrder { start: NaiveDate, end: NaiveDate },

    #[error("at least one domain must be specified")]
    NoDomains,

    #[error("domain #{index} must have a 'name' field")]
    MissingDomainName { index: usize },

    #[error("domain '{domain}' must have a 'group' field")]
    MissingDomainGroup { domain: String },

    #[error("domain '{0}' is declared more than once")]
    DuplicateDomain(String),

    #[error("at least one group must be specified")]
    NoGroups,

    #[error("group #{index} must have a 'name' field")]
    MissingGroupName { index: usize },

    #[error("group '{group}' must have an '{field}' field")]
    MissingGroupField { group: String, field: &'static str },

    #[error("group '{0}' is declared more than once")]
    DuplicateGroup(String),

    #[error("group '{group}' references unknown parent group '{parent}'")]
    UnknownParent { group: String, parent: String },

    #[error("group '{group}' has parent '{parent}', which is itself a subgroup (only two levels allowed)")]
    NestedSubgroup { group: String, parent: String },

    #[error("domain '{domain}' references unknown group '{group}'")]
    UnknownGroup { domain: String, group: String },

    #[error("domain '{domain}' uses '{group}' as its group, but it is a subgroup")]
    GroupIsSubgroup { domain: String, group: String },

    #[error("domain '{domain}' references unknown subgroup '{subgroup}'")]
    UnknownSubgroup { domain: String, subgroup: String },

    #[error("subgroup '{subgroup}' is not a child of group '{group}'")]
    NotChildOfGroup { subgroup: String, group: String },

    #[error("settings.chunk_months must be at least 1 (got {0})")]
    InvalidChunkMonths(u32),
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    dates: Option<RawDates>,
    domains: Option<Vec<RawDomain>>,
    groups: Option<Vec<RawGroup>>,
    settings: Option<RawSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDates {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDomain {
    name: Option<String>,
    group: Option<String>,
    subgroup: Option<String>,
    file_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: Option<String>,
    output_dir: Option<String>,
    output_file: Option<String>,
    parent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSettings {
    chunk_months: Option<u32>,
    detailed_data: Option<bool>,
    combine_all: Option<bool>,
    combine_by_group: Option<bool>,
}

impl RawSettings {
    /// Keys present in the file win, absent keys take the default.
    fn merge_with_defaults(self) -> Settings {
        let defaults = Settings::default();
        Settings {
            chunk_months: self.chunk_months.unwrap_or(defaults.chunk_months),
            detailed_data: self.detailed_data.unwrap_or(defaults.detailed_data),
            combine_all: self.combine_all.unwrap_or(defaults.combine_all),
            combine_by_group: self.combine_by_group.unwrap_or(defaults.combine_by_group),
        }
    }
}

/// Validated, cross-referenced configuration. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub dates: DateRange,
    pub settings: Settings,
    pub domains: Vec<Domain>,
    nodes: Vec<HierarchyNode>,
    node_index: HashMap<String, usize>,
    domain_by_group: HashMap<String, Vec<usize>>,
    domain_by_subgroup: HashMap<String, Vec<usize>>,
}

impl ResolvedConfig {
    /// Nodes in configuration order (a synthesized `all` node comes last).
    pub fn nodes(&self) -> &[HierarchyNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&HierarchyNode> {
        self.node_index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn subgroups(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter().filter(|n| n.is_subgroup())
    }

    /// Top-level groups, excluding the reserved `all` node.
    pub fn top_level_groups(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes
            .iter()
            .filter(|n| !n.is_subgroup() && n.name() != ALL_NODE)
    }

    pub fn all_node(&self) -> Option<&HierarchyNode> {
        self.node(ALL_NODE)
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn domains_in_group(&self, group: &str) -> Vec<&Domain> {
        self.members(&self.domain_by_group, group)
    }

    pub fn domains_in_subgroup(&self, subgroup: &str) -> Vec<&Domain> {
        self.members(&self.domain_by_subgroup, subgroup)
    }

    /// Every path an aggregation node writes to.
    pub fn aggregate_outputs(&self) -> HashSet<PathBuf> {
        self.nodes.iter().map(|n| n.output().path()).collect()
    }

    fn members(&self, index: &HashMap<String, Vec<usize>>, name: &str) -> Vec<&Domain> {
        index
            .get(name)
            .map(|ids| ids.iter().map(|&i| &self.domains[i]).collect())
            .unwrap_or_default()
    }
}

pub fn load_config(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<ResolvedConfig, ConfigError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text)?;
    for section in REQUIRED_SECTIONS {
        if value.get(section).is_none() {
            return Err(ConfigError::MissingSection(section));
        }
    }
    let raw: RawConfig = serde_yaml::from_value(value)?;

    let dates = resolve_dates(raw.dates.unwrap_or_default())?;

    let raw_domains = raw.domains.unwrap_or_default();
    if raw_domains.is_empty() {
        return Err(ConfigError::NoDomains);
    }
    let raw_domains = check_domain_fields(raw_domains)?;

    let raw_groups = raw.groups.unwrap_or_default();
    if raw_groups.is_empty() {
        return Err(ConfigError::NoGroups);
    }
    let (mut nodes, mut node_index) = build_hierarchy(raw_groups)?;

    let domains = resolve_domains(raw_domains, &nodes, &node_index)?;

    let settings = raw.settings.unwrap_or_default().merge_with_defaults();
    if settings.chunk_months == 0 {
        return Err(ConfigError::InvalidChunkMonths(settings.chunk_months));
    }

    if settings.combine_all && !node_index.contains_key(ALL_NODE) {
        warn!(
            output_dir = DEFAULT_ALL_OUTPUT_DIR,
            output_file = DEFAULT_ALL_OUTPUT_FILE,
            "combine_all is enabled but no 'all' group is defined; adding default 'all' group"
        );
        node_index.insert(ALL_NODE.to_string(), nodes.len());
        nodes.push(HierarchyNode::Group(GroupNode {
            name: ALL_NODE.to_string(),
            output: OutputTarget::new(DEFAULT_ALL_OUTPUT_DIR, DEFAULT_ALL_OUTPUT_FILE),
            children: Vec::new(),
        }));
    }

    let mut domain_by_group: HashMap<String, Vec<usize>> = HashMap::new();
    let mut domain_by_subgroup: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, domain) in domains.iter().enumerate() {
        domain_by_group
            .entry(domain.group.clone())
            .or_default()
            .push(i);
        if let Some(sub) = &domain.subgroup {
            domain_by_subgroup.entry(sub.clone()).or_default().push(i);
        }
    }

    debug!(
        domains = domains.len(),
        nodes = nodes.len(),
        ?settings,
        "configuration resolved"
    );

    Ok(ResolvedConfig {
        dates,
        settings,
        domains,
        nodes,
        node_index,
        domain_by_group,
        domain_by_subgroup,
    })
}

fn parse_date(key: &'static str, value: Option<String>) -> Result<NaiveDate, ConfigError> {
    let value = value.ok_or(ConfigError::MissingDate(key))?;
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ConfigError::BadDateFormat { key, value })
}

fn resolve_dates(raw: RawDates) -> Result<DateRange, ConfigError> {
    let start = parse_date("start_date", raw.start_date)?;
    let end = parse_date("end_date", raw.end_date)?;
    if start > end {
        return Err(ConfigError::DateOrder { start, end });
    }
    Ok(DateRange { start, end })
}

struct CheckedDomain {
    name: String,
    group: String,
    subgroup: Option<String>,
    file_prefix: Option<String>,
}

fn check_domain_fields(raw: Vec<RawDomain>) -> Result<Vec<CheckedDomain>, ConfigError> {
    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(raw.len());
    for (index, d) in raw.into_iter().enumerate() {
        let name = d.name.ok_or(ConfigError::MissingDomainName { index })?;
        let group = d.group.ok_or_else(|| ConfigError::MissingDomainGroup {
            domain: name.clone(),
        })?;
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateDomain(name));
        }
        checked.push(CheckedDomain {
            name,
            group,
            subgroup: d.subgroup,
            file_prefix: d.file_prefix,
        });
    }
    Ok(checked)
}

fn build_hierarchy(
    raw: Vec<RawGroup>,
) -> Result<(Vec<HierarchyNode>, HashMap<String, usize>), ConfigError> {
    // name -> (output, parent)
    let mut entries: Vec<(String, OutputTarget, Option<String>)> = Vec::with_capacity(raw.len());
    let mut node_index = HashMap::new();
    for (index, g) in raw.into_iter().enumerate() {
        let name = g.name.ok_or(ConfigError::MissingGroupName { index })?;
        let output_dir = g.output_dir.ok_or_else(|| ConfigError::MissingGroupField {
            group: name.clone(),
            field: "output_dir",
        })?;
        let output_file = g.output_file.ok_or_else(|| ConfigError::MissingGroupField {
            group: name.clone(),
            field: "output_file",
        })?;
        if node_index.insert(name.clone(), entries.len()).is_some() {
            return Err(ConfigError::DuplicateGroup(name));
        }
        entries.push((name, OutputTarget::new(output_dir, output_file), g.parent));
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    for (name, _, parent) in &entries {
        let Some(parent) = parent else { continue };
        let Some(&parent_idx) = node_index.get(parent) else {
            return Err(ConfigError::UnknownParent {
                group: name.clone(),
                parent: parent.clone(),
            });
        };
        if entries[parent_idx].2.is_some() {
            return Err(ConfigError::NestedSubgroup {
                group: name.clone(),
                parent: parent.clone(),
            });
        }
        children
            .entry(parent.clone())
            .or_default()
            .push(name.clone());
    }

    let nodes = entries
        .into_iter()
        .map(|(name, output, parent)| match parent {
            Some(parent) => HierarchyNode::Subgroup(SubgroupNode {
                name,
                output,
                parent,
            }),
            None => {
                let children = children.remove(&name).unwrap_or_default();
                HierarchyNode::Group(GroupNode {
                    name,
                    output,
                    children,
                })
            }
        })
        .collect();
    Ok((nodes, node_index))
}

fn resolve_domains(
    raw: Vec<CheckedDomain>,
    nodes: &[HierarchyNode],
    node_index: &HashMap<String, usize>,
) -> Result<Vec<Domain>, ConfigError> {
    let mut domains = Vec::with_capacity(raw.len());
    for d in raw {
        let group_node = match node_index.get(&d.group).map(|&i| &nodes[i]) {
            None => {
                return Err(ConfigError::UnknownGroup {
                    domain: d.name,
                    group: d.group,
                })
            }
            Some(HierarchyNode::Subgroup(_)) => {
                return Err(ConfigError::GroupIsSubgroup {
                    domain: d.name,
                    group: d.group,
                })
            }
            Some(node) => node,
        };

        let output = match &d.subgroup {
            Some(sub) => {
                let Some(sub_node) = node_index.get(sub).map(|&i| &nodes[i]) else {
                    return Err(ConfigError::UnknownSubgroup {
                        domain: d.name,
                        subgroup: sub.clone(),
                    });
                };
                if sub_node.parent() != Some(d.group.as_str()) {
                    return Err(ConfigError::NotChildOfGroup {
                        subgroup: sub.clone(),
                        group: d.group,
                    });
                }
                sub_node.output().clone()
            }
            None => group_node.output().clone(),
        };

        let file_prefix = d
            .file_prefix
            .unwrap_or_else(|| Domain::default_prefix(&d.name));
        domains.push(Domain {
            name: d.name,
            group: d.group,
            subgroup: d.subgroup,
            file_prefix,
            output,
        });
    }
    Ok(domains)
}
