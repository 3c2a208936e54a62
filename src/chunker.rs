use anyhow::{anyhow, ensure, Result};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive sub-interval of the configured date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Adds calendar months, clamping the day to the end of the target month
/// (Jan 31 + 1 month is Feb 28/29).
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| anyhow!("date overflow adding {} months to {}", months, date))
}

/// Splits `[start, end]` into consecutive chunks of at most `chunk_months`
/// months. Chunks never overlap and leave no gap; the last one may be shorter.
pub fn chunk_date_range(
    start: NaiveDate,
    end: NaiveDate,
    chunk_months: u32,
) -> Result<Vec<DateChunk>> {
    ensure!(
        chunk_months >= 1,
        "chunk_months must be at least 1 (got {})",
        chunk_months
    );
    ensure!(
        start <= end,
        "start date {} is after end date {}",
        start,
        end
    );

    let mut chunks = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let candidate = add_months(cursor, chunk_months)?;
        let chunk_end = candidate.min(end);
        chunks.push(DateChunk {
            start: cursor,
            end: chunk_end,
        });

        // The cursor must move strictly forward or the loop would never end.
        match chunk_end.succ_opt() {
            Some(next) if next > cursor => cursor = next,
            _ => break,
        }
    }
    Ok(chunks)
}
