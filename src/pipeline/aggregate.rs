use crate::loader::read_table;
use crate::schema::UnifiedSchema;
use crate::writer::write_table;
use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct AggregateOutcome {
    /// `None` when there was nothing readable to merge.
    pub table: Option<DataFrame>,
    pub total_rows: usize,
    pub files_merged: usize,
}

impl AggregateOutcome {
    fn empty() -> Self {
        Self {
            table: None,
            total_rows: 0,
            files_merged: 0,
        }
    }
}

/// Merges `files` into one table written to `output`.
///
/// Pass 1 reads every file to build the union of columns and a common dtype
/// per column; pass 2 re-reads the files that succeeded in pass 1, back-fills
/// missing columns, casts to the common dtypes and concatenates them in the
/// given order. Unreadable files are logged and left out of both the output
/// and the row total.
pub fn aggregate_files(files: &[PathBuf], output: &Path) -> Result<AggregateOutcome> {
    if files.is_empty() {
        info!("no files to combine");
        return Ok(AggregateOutcome::empty());
    }

    let mut schema = UnifiedSchema::new();
    let mut readable: Vec<&PathBuf> = Vec::with_capacity(files.len());
    for file in files {
        match read_table(file) {
            Ok(df) => {
                schema.observe(&df);
                readable.push(file);
            }
            Err(e) => {
                warn!(path=?file, error=%format!("{:#}", e), "error reading file during schema discovery; excluding it");
            }
        }
    }
    info!(columns=?schema.columns(), "unified schema");

    let mut frames = Vec::with_capacity(readable.len());
    let mut total_rows = 0usize;
    for file in readable {
        let conformed = read_table(file).and_then(|df| {
            schema
                .conform(df)
                .with_context(|| format!("Failed to unify columns of {:?}", file))
        });
        match conformed {
            Ok(df) => {
                debug!(path=?file, rows=df.height(), "read file");
                total_rows += df.height();
                frames.push(df.lazy());
            }
            Err(e) => {
                warn!(path=?file, error=%format!("{:#}", e), "error reading file; excluding it");
            }
        }
    }

    if frames.is_empty() {
        warn!("no valid data files to combine");
        return Ok(AggregateOutcome::empty());
    }

    let files_merged = frames.len();
    let mut combined = concat(
        frames,
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?
    .collect()
    .context("Failed to concatenate tables")?;

    for column in combined.get_columns() {
        debug!(column=%column.name(), dtype=%column.dtype(), "combined schema");
    }
    if combined.height() != total_rows {
        warn!(
            combined_rows = combined.height(),
            total_rows, "combined row count differs from the sum of input rows"
        );
    }

    write_table(output, &mut combined)?;
    info!(
        output=?output,
        files=files_merged,
        total_rows,
        combined_rows=combined.height(),
        "combined data saved"
    );

    Ok(AggregateOutcome {
        table: Some(combined),
        total_rows,
        files_merged,
    })
}
