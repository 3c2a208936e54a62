use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Reads one parquet table into memory.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open table file: {:?}", path))?;
    ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read parquet file: {:?}", path))
}
