use crate::cli::AnalyzeArgs;
use crate::loader::read_table;
use crate::structures::{DATE_COLUMN, GROUP_COLUMN, SECONDS_COLUMN, SUBGROUP_COLUMN};
use anyhow::Result;
use chrono::Utc;
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use tracing::{info, instrument, warn};

const TOP_DAYS: IdxSize = 5;
const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryHours {
    pub group: String,
    pub subgroup: String,
    pub total_seconds: f64,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayHours {
    pub day: String,
    pub total_seconds: f64,
    pub hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum TopDays {
    Days(Vec<DayHours>),
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    /// `None` if the duration column could not be summed.
    pub total_hours: Option<f64>,
    /// Present only when the table carries both category columns.
    pub breakdown: Option<Vec<CategoryHours>>,
    pub top_days: TopDays,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SummaryOutcome {
    NoData,
    Report(Summary),
}

/// Descriptive statistics over an aggregated table.
///
/// Each statistic is computed on its own; one that fails is logged and left
/// out while the rest are still reported.
pub fn summarize(table: Option<&DataFrame>) -> SummaryOutcome {
    let Some(df) = table.filter(|df| df.height() > 0) else {
        return SummaryOutcome::NoData;
    };

    let (date_min, date_max) = match date_range(df) {
        Ok(range) => range,
        Err(e) => {
            warn!(error=%e, "could not compute date range");
            (None, None)
        }
    };

    let total_hours = match total_seconds(df) {
        Ok(s) => Some(s / SECONDS_PER_HOUR),
        Err(e) => {
            warn!(error=%e, "could not compute total time");
            None
        }
    };

    let has_categories = df.column(GROUP_COLUMN).is_ok() && df.column(SUBGROUP_COLUMN).is_ok();
    let breakdown = if has_categories {
        match category_breakdown(df) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error=%e, "could not compute category breakdown");
                None
            }
        }
    } else {
        None
    };

    let top_days = match top_days(df) {
        Ok(days) => TopDays::Days(days),
        Err(e) => TopDays::Unavailable(e.to_string()),
    };

    SummaryOutcome::Report(Summary {
        rows: df.height(),
        date_min,
        date_max,
        total_hours,
        breakdown,
        top_days,
    })
}

fn seconds_expr() -> Expr {
    col(SECONDS_COLUMN).cast(DataType::Float64)
}

fn date_range(df: &DataFrame) -> PolarsResult<(Option<String>, Option<String>)> {
    let date = col(DATE_COLUMN).cast(DataType::String);
    let out = df
        .clone()
        .lazy()
        .select([date.clone().min().alias("min"), date.max().alias("max")])
        .collect()?;
    let min = out.column("min")?.str()?.get(0).map(str::to_string);
    let max = out.column("max")?.str()?.get(0).map(str::to_string);
    Ok((min, max))
}

fn total_seconds(df: &DataFrame) -> PolarsResult<f64> {
    let out = df
        .clone()
        .lazy()
        .select([seconds_expr().sum().alias("total_seconds")])
        .collect()?;
    Ok(out.column("total_seconds")?.f64()?.get(0).unwrap_or(0.0))
}

fn descending() -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending(true)
        .with_maintain_order(true)
}

/// Hours per (group, subgroup), largest first; ties keep input order.
fn category_breakdown(df: &DataFrame) -> PolarsResult<Vec<CategoryHours>> {
    let out = df
        .clone()
        .lazy()
        .group_by_stable([col(GROUP_COLUMN), col(SUBGROUP_COLUMN)])
        .agg([seconds_expr().sum().alias("total_seconds")])
        .sort(["total_seconds"], descending())
        .collect()?;

    let groups = out.column(GROUP_COLUMN)?.cast(&DataType::String)?;
    let subgroups = out.column(SUBGROUP_COLUMN)?.cast(&DataType::String)?;
    let groups = groups.str()?;
    let subgroups = subgroups.str()?;
    let totals = out.column("total_seconds")?.f64()?;

    let mut rows = Vec::with_capacity(out.height());
    for i in 0..out.height() {
        let total = totals.get(i).unwrap_or(0.0);
        rows.push(CategoryHours {
            group: groups.get(i).unwrap_or_default().to_string(),
            subgroup: subgroups.get(i).unwrap_or_default().to_string(),
            total_seconds: total,
            hours: total / SECONDS_PER_HOUR,
        });
    }
    Ok(rows)
}

/// Busiest calendar days, using the first 10 characters of the date value.
fn top_days(df: &DataFrame) -> PolarsResult<Vec<DayHours>> {
    let out = df
        .clone()
        .lazy()
        .with_column(
            col(DATE_COLUMN)
                .cast(DataType::String)
                .str()
                .slice(lit(0), lit(10))
                .alias("day"),
        )
        .group_by_stable([col("day")])
        .agg([seconds_expr().sum().alias("total_seconds")])
        .sort(["total_seconds"], descending())
        .limit(TOP_DAYS)
        .collect()?;

    let days = out.column("day")?.str()?;
    let totals = out.column("total_seconds")?.f64()?;
    let mut rows = Vec::with_capacity(out.height());
    for i in 0..out.height() {
        let total = totals.get(i).unwrap_or(0.0);
        rows.push(DayHours {
            day: days.get(i).unwrap_or_default().to_string(),
            total_seconds: total,
            hours: total / SECONDS_PER_HOUR,
        });
    }
    Ok(rows)
}

/// Logs a summary for one aggregation node.
pub fn log_summary(outcome: &SummaryOutcome, label: &str, domain_names: &[&str]) {
    let summary = match outcome {
        SummaryOutcome::NoData => {
            info!(node=%label, "no data to summarize");
            return;
        }
        SummaryOutcome::Report(s) => s,
    };

    info!(
        node=%label,
        rows=summary.rows,
        date_min=summary.date_min.as_deref().unwrap_or("?"),
        date_max=summary.date_max.as_deref().unwrap_or("?"),
        "data summary"
    );
    if let Some(hours) = summary.total_hours {
        info!(
            node=%label,
            domains=%domain_names.join(", "),
            "total time spent: {:.2} hours",
            hours
        );
    }
    if let Some(rows) = &summary.breakdown {
        for row in rows {
            info!(
                node=%label,
                group=%row.group,
                subgroup=%row.subgroup,
                "category: {:.2} hours",
                row.hours
            );
        }
    }
    match &summary.top_days {
        TopDays::Days(days) => {
            for day in days {
                info!(node=%label, day=%day.day, "top day: {:.2} hours", day.hours);
            }
        }
        TopDays::Unavailable(reason) => {
            warn!(node=%label, reason=%reason, "could not compute top days");
        }
    }
}

pub fn render_markdown(outcome: &SummaryOutcome, title: &str) -> String {
    let mut md = String::new();
    md.push_str(&format!("# {}\n\n", title));
    md.push_str(&format!("Generated: {}\n\n", Utc::now().to_rfc3339()));

    let summary = match outcome {
        SummaryOutcome::NoData => {
            md.push_str("No data.\n");
            return md;
        }
        SummaryOutcome::Report(s) => s,
    };

    md.push_str("## Overview\n\n");
    md.push_str("| Metric | Value |\n|---|---:|\n");
    md.push_str(&format!("| Rows | {} |\n", summary.rows));
    md.push_str(&format!(
        "| First date | {} |\n",
        summary.date_min.as_deref().unwrap_or("-")
    ));
    md.push_str(&format!(
        "| Last date | {} |\n",
        summary.date_max.as_deref().unwrap_or("-")
    ));
    match summary.total_hours {
        Some(h) => md.push_str(&format!("| Total hours | {:.2} |\n", h)),
        None => md.push_str("| Total hours | - |\n"),
    }

    if let Some(rows) = &summary.breakdown {
        md.push_str("\n## By Category\n\n| Group | Subgroup | Hours |\n|---|---|---:|\n");
        for row in rows {
            md.push_str(&format!(
                "| {} | {} | {:.2} |\n",
                row.group, row.subgroup, row.hours
            ));
        }
    }

    md.push_str("\n## Top Days\n\n");
    match &summary.top_days {
        TopDays::Days(days) => {
            md.push_str("| Day | Hours |\n|---|---:|\n");
            for day in days {
                md.push_str(&format!("| {} | {:.2} |\n", day.day, day.hours));
            }
        }
        TopDays::Unavailable(reason) => {
            md.push_str(&format!("Could not compute top days: {}\n", reason));
        }
    }
    md
}

#[instrument(skip(args))]
pub fn run_analyze(args: AnalyzeArgs) -> Result<SummaryOutcome> {
    info!(input=?args.input, "starting analysis");
    let df = read_table(&args.input)?;
    let outcome = summarize(Some(&df));

    let label = args.input.display().to_string();
    log_summary(&outcome, &label, &[]);

    if let Some(report) = &args.report {
        if let Some(parent) = report.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let title = format!("Activity Report: {}", label);
        std::fs::write(report, render_markdown(&outcome, &title))?;
        info!(report=?report, "markdown report written");
    }
    if let Some(json) = &args.json {
        let f = File::create(json)?;
        serde_json::to_writer_pretty(f, &outcome)?;
        info!(json=?json, "json summary written");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: SummaryOutcome) -> Summary {
        match outcome {
            SummaryOutcome::Report(s) => s,
            SummaryOutcome::NoData => panic!("expected a report"),
        }
    }

    #[test]
    fn single_day_totals() {
        let df = df!(
            "Date" => ["2023-01-01", "2023-01-01"],
            "Time Spent (seconds)" => [3600i64, 1800]
        )
        .unwrap();
        let s = report(summarize(Some(&df)));
        assert_eq!(s.rows, 2);
        assert_eq!(s.total_hours, Some(1.5));
        assert_eq!(s.date_min.as_deref(), Some("2023-01-01"));
        assert!(s.breakdown.is_none());
        match s.top_days {
            TopDays::Days(days) => {
                assert_eq!(days.len(), 1);
                assert_eq!(days[0].day, "2023-01-01");
                assert_eq!(days[0].hours, 1.5);
            }
            TopDays::Unavailable(r) => panic!("top days unavailable: {}", r),
        }
    }

    #[test]
    fn empty_or_absent_table_is_no_data() {
        assert!(matches!(summarize(None), SummaryOutcome::NoData));
        let empty = df!("Date" => Vec::<&str>::new(), "Time Spent (seconds)" => Vec::<i64>::new()).unwrap();
        assert!(matches!(summarize(Some(&empty)), SummaryOutcome::NoData));
    }

    #[test]
    fn timestamps_are_truncated_to_days_and_top_five_kept() {
        let df = df!(
            "Date" => [
                "2023-01-01T09:00:00", "2023-01-01T10:00:00", "2023-01-02T09:00:00",
                "2023-01-03T09:00:00", "2023-01-04T09:00:00", "2023-01-05T09:00:00",
                "2023-01-06T09:00:00"
            ],
            "Time Spent (seconds)" => [1800i64, 1800, 600, 7200, 60, 120, 180]
        )
        .unwrap();
        let s = report(summarize(Some(&df)));
        assert_eq!(s.date_max.as_deref(), Some("2023-01-06T09:00:00"));
        let TopDays::Days(days) = s.top_days else {
            panic!("top days unavailable")
        };
        let order: Vec<&str> = days.iter().map(|d| d.day.as_str()).collect();
        assert_eq!(
            order,
            ["2023-01-03", "2023-01-01", "2023-01-02", "2023-01-06", "2023-01-05"]
        );
        assert_eq!(days[1].hours, 1.0);
    }

    #[test]
    fn breakdown_is_sorted_and_stable() {
        let df = df!(
            "Date" => ["2023-01-01", "2023-01-01", "2023-01-02", "2023-01-02"],
            "Time Spent (seconds)" => [3600i64, 1800, 1800, 3600],
            "group" => ["work", "leisure", "hobby", "work"],
            "subgroup" => ["clients", "video", "music", "clients"]
        )
        .unwrap();
        let s = report(summarize(Some(&df)));
        let rows = s.breakdown.expect("breakdown");
        let order: Vec<(&str, f64)> = rows.iter().map(|r| (r.group.as_str(), r.hours)).collect();
        assert_eq!(order, [("work", 2.0), ("leisure", 0.5), ("hobby", 0.5)]);
    }

    #[test]
    fn missing_date_column_only_drops_date_statistics() {
        let df = df!("Time Spent (seconds)" => [3600i64]).unwrap();
        let s = report(summarize(Some(&df)));
        assert_eq!(s.total_hours, Some(1.0));
        assert!(s.date_min.is_none());
        assert!(matches!(s.top_days, TopDays::Unavailable(_)));
    }

    #[test]
    fn markdown_lists_sections() {
        let df = df!(
            "Date" => ["2023-01-01"],
            "Time Spent (seconds)" => [7200i64],
            "group" => ["work"],
            "subgroup" => ["clients"]
        )
        .unwrap();
        let md = render_markdown(&summarize(Some(&df)), "Report");
        assert!(md.contains("| Total hours | 2.00 |"));
        assert!(md.contains("| work | clients | 2.00 |"));
        assert!(md.contains("| 2023-01-01 | 2.00 |"));
        assert!(render_markdown(&SummaryOutcome::NoData, "Empty").contains("No data."));
    }
}
