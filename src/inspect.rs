use crate::chunker::{chunk_date_range, DateChunk};
use crate::cli::{CheckArgs, ChunksArgs};
use crate::config::{load_config, ResolvedConfig};
use crate::structures::{Domain, HierarchyNode, ALL_NODE};
use anyhow::Result;
use colored::Colorize;

fn domain_line(d: &Domain) -> String {
    format!(
        "{} {}",
        d.name,
        format!("-> {}_*.parquet", d.output.dir.join(&d.file_prefix).display()).dimmed()
    )
}

fn node_line(node: &HierarchyNode) -> String {
    format!(
        "{} {}",
        node.name().bold(),
        format!("[{}]", node.output().path().display()).cyan()
    )
}

/// Renders the group/subgroup tree with member domains.
pub fn render_hierarchy(config: &ResolvedConfig) -> String {
    let mut out = String::new();
    for node in config.top_level_groups() {
        out.push_str(&format!("{}\n", node_line(node)));
        for child in node.children() {
            let Some(child_node) = config.node(child) else { continue };
            out.push_str(&format!("  {}\n", node_line(child_node)));
            for d in config.domains_in_subgroup(child) {
                out.push_str(&format!("    - {}\n", domain_line(d)));
            }
        }
        for d in config
            .domains_in_group(node.name())
            .into_iter()
            .filter(|d| d.subgroup.is_none())
        {
            out.push_str(&format!("  - {}\n", domain_line(d)));
        }
    }
    if let Some(all) = config.all_node() {
        out.push_str(&format!("{} ({} domains)\n", node_line(all), config.domains.len()));
    } else {
        out.push_str(&format!("{}\n", format!("'{}' aggregation disabled", ALL_NODE).dimmed()));
    }
    out
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    println!(
        "{} {} ({} to {})",
        "Configuration OK:".green().bold(),
        args.config.display(),
        config.dates.start,
        config.dates.end
    );
    println!(
        "Settings: chunk_months={} detailed_data={} combine_by_group={} combine_all={}",
        config.settings.chunk_months,
        config.settings.detailed_data,
        config.settings.combine_by_group,
        config.settings.combine_all
    );
    println!();
    print!("{}", render_hierarchy(&config));
    Ok(())
}

pub fn plan_chunks(args: &ChunksArgs) -> Result<Vec<DateChunk>> {
    let (start, end, months) = match (args.start, args.end, args.months) {
        (Some(s), Some(e), Some(m)) => (s, e, m),
        (start, end, months) => {
            let config = load_config(&args.config)?;
            (
                start.unwrap_or(config.dates.start),
                end.unwrap_or(config.dates.end),
                months.unwrap_or(config.settings.chunk_months),
            )
        }
    };
    chunk_date_range(start, end, months)
}

pub fn run_chunks(args: ChunksArgs) -> Result<()> {
    let chunks = plan_chunks(&args)?;
    println!("{} chunks:", chunks.len());
    for (i, c) in chunks.iter().enumerate() {
        println!("  Chunk {}: {}", i + 1, c);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    #[test]
    fn tree_lists_every_domain_once() {
        colored::control::set_override(false);
        let config = parse_config(
            r#"
dates: {start_date: "2023-01-01", end_date: "2023-03-01"}
domains:
  - {name: graphext.com, group: work, subgroup: clients}
  - {name: github.com, group: work}
groups:
  - {name: work, output_dir: w, output_file: w.parquet}
  - {name: clients, output_dir: c, output_file: c.parquet, parent: work}
"#,
        )
        .unwrap();
        let tree = render_hierarchy(&config);
        assert_eq!(tree.matches("graphext.com").count(), 1);
        assert_eq!(tree.matches("github.com").count(), 1);
        assert!(tree.contains("  clients [c/c.parquet]"));
        assert!(tree.contains("all [rescuetime_data/all_domains_history.parquet] (2 domains)"));
    }

    #[test]
    fn explicit_chunk_arguments_skip_the_config() {
        let args = ChunksArgs {
            config: PathBuf::from("/does/not/exist.yml"),
            start: NaiveDate::from_ymd_opt(2023, 1, 31),
            end: NaiveDate::from_ymd_opt(2023, 3, 31),
            months: Some(1),
        };
        let chunks = plan_chunks(&args).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].end, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
    }
}
