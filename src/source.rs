use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RESCUETIME_DATA_URL: &str = "https://www.rescuetime.com/anapi/data";
pub const API_KEY_VAR: &str = "RESCUETIME_API_KEY";

/// Columns searched for the domain name, case-insensitively.
const DOMAIN_COLUMNS: [&str; 4] = ["Document", "Activity", "Category", "Description"];

/// Remote source of activity rows for one domain and date range.
pub trait ActivitySource {
    /// `Ok(None)` means the request succeeded but nothing matched the domain.
    fn fetch(&self, domain: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<DataFrame>>;
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub row_headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub struct RescueTimeClient {
    client: Client,
    api_key: String,
    base_url: String,
    hourly: bool,
}

impl RescueTimeClient {
    pub fn new(api_key: String, hourly: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: RESCUETIME_DATA_URL.to_string(),
            hourly,
        })
    }

    pub fn from_env(hourly: bool) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .with_context(|| format!("{} not set (environment or .env file)", API_KEY_VAR))?;
        Self::new(api_key, hourly)
    }

    /// Hourly resolution is requested only for `detailed_data`; otherwise the
    /// API picks its default (daily) resolution.
    pub fn query_params(&self, start: NaiveDate, end: NaiveDate) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("perspective", "interval".to_string()),
            ("restrict_begin", start.to_string()),
            ("restrict_end", end.to_string()),
            ("format", "json".to_string()),
        ];
        if self.hourly {
            params.push(("resolution_time", "hour".to_string()));
        }
        params
    }
}

impl ActivitySource for RescueTimeClient {
    fn fetch(&self, domain: &str, start: NaiveDate, end: NaiveDate) -> Result<Option<DataFrame>> {
        let params = self.query_params(start, end);
        debug!(domain=%domain, %start, %end, "requesting activity data");
        let response = self.client.get(&self.base_url).query(&params).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "RescueTime API returned status {} for {} ({} to {}): {}",
                status,
                domain,
                start,
                end,
                body
            ));
        }

        let payload: ApiResponse =
            serde_json::from_reader(response).context("Failed to parse RescueTime response")?;
        rows_to_frame(payload, domain, Utc::now())
    }
}

/// Keeps the rows mentioning `domain`, builds a typed table from them and
/// tags it with fetch metadata.
pub fn rows_to_frame(
    payload: ApiResponse,
    domain: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Option<DataFrame>> {
    let search: Vec<usize> = payload
        .row_headers
        .iter()
        .enumerate()
        .filter(|(_, h)| DOMAIN_COLUMNS.contains(&h.as_str()))
        .map(|(i, _)| i)
        .collect();
    if search.is_empty() {
        warn!(domain=%domain, columns=?payload.row_headers, "no searchable column in response");
        return Ok(None);
    }

    let needle = domain.to_lowercase();
    let rows: Vec<&Vec<Value>> = payload
        .rows
        .iter()
        .filter(|row| {
            search.iter().any(|&i| {
                row.get(i)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
        })
        .collect();
    if rows.is_empty() {
        info!(domain=%domain, total_rows=payload.rows.len(), "no data found for domain");
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(payload.row_headers.len() + 2);
    for (i, header) in payload.row_headers.iter().enumerate() {
        let values: Vec<&Value> = rows
            .iter()
            .map(|row| row.get(i).unwrap_or(&Value::Null))
            .collect();
        columns.push(json_column(header, &values));
    }
    let height = rows.len();
    let stamp = fetched_at.to_rfc3339();
    columns.push(Column::new(
        "fetch_timestamp".into(),
        vec![stamp.as_str(); height],
    ));
    columns.push(Column::new("query_domain".into(), vec![domain; height]));

    let df = DataFrame::new(columns).context("Failed to build table from response")?;
    Ok(Some(df))
}

/// Int64 when every value is an integer, Float64 when every value is a
/// number, String otherwise. Nulls are allowed in all three.
fn json_column(name: &str, values: &[&Value]) -> Column {
    let non_null = || values.iter().filter(|v| !v.is_null());
    if non_null().all(|v| v.is_i64()) {
        let data: Vec<Option<i64>> = values.iter().map(|v| v.as_i64()).collect();
        Column::new(name.into(), data)
    } else if non_null().all(|v| v.is_number()) {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<String>> = values
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> ApiResponse {
        serde_json::from_value(json!({
            "row_headers": ["Date", "Time Spent (seconds)", "Number of People", "Activity", "Category", "Productivity"],
            "rows": [
                ["2023-01-01T10:00:00", 300, 1, "app.Graphext.com", "Business", 2],
                ["2023-01-01T11:00:00", 120, 1, "youtube.com", "Video", -2],
                ["2023-01-02T09:00:00", 60, 1, "docs", "graphext.com", 2]
            ]
        }))
        .unwrap()
    }

    #[test]
    fn keeps_rows_mentioning_domain() {
        let df = rows_to_frame(payload(), "graphext.com", Utc::now())
            .unwrap()
            .expect("rows");
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column("Time Spent (seconds)").unwrap().dtype(),
            &DataType::Int64
        );
        assert_eq!(df.column("Activity").unwrap().dtype(), &DataType::String);
        let tagged = df.column("query_domain").unwrap().str().unwrap().get(1);
        assert_eq!(tagged, Some("graphext.com"));
        assert!(df.column("fetch_timestamp").is_ok());
    }

    #[test]
    fn no_match_is_no_data() {
        assert!(rows_to_frame(payload(), "example.org", Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn no_searchable_column_is_no_data() {
        let payload: ApiResponse = serde_json::from_value(json!({
            "row_headers": ["Date", "Time Spent (seconds)"],
            "rows": [["2023-01-01", 10]]
        }))
        .unwrap();
        assert!(rows_to_frame(payload, "graphext.com", Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn hourly_resolution_follows_detailed_data() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
        let has_hourly = |client: RescueTimeClient| {
            client
                .query_params(start, end)
                .iter()
                .any(|(k, v)| *k == "resolution_time" && v == "hour")
        };
        assert!(has_hourly(RescueTimeClient::new("k".into(), true).unwrap()));
        assert!(!has_hourly(RescueTimeClient::new("k".into(), false).unwrap()));

        let params = RescueTimeClient::new("secret".into(), false)
            .unwrap()
            .query_params(start, end);
        assert!(params.contains(&("restrict_begin", "2023-01-01".to_string())));
        assert!(params.contains(&("restrict_end", "2023-03-31".to_string())));
        assert!(params.contains(&("key", "secret".to_string())));
    }

    #[test]
    fn mixed_numbers_become_floats() {
        let a = json!(1);
        let b = json!(2.5);
        let null = Value::Null;
        let column = json_column("x", &[&a, &b, &null]);
        assert_eq!(column.dtype(), &DataType::Float64);
        assert_eq!(column.null_count(), 1);
    }
}
