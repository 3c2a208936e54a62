use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Writes `df` as parquet to `path`, creating parent directories as needed.
pub fn write_table(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }
    }
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("Failed to write parquet file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_table;
    use tempfile::TempDir;

    #[test]
    fn round_trips_types_and_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/table.parquet");
        let mut df = df!(
            "Date" => ["2023-01-01T10:00:00", "2023-01-02T11:00:00"],
            "Time Spent (seconds)" => [300i64, 120],
            "Productivity" => [2i64, -1]
        )
        .unwrap();
        write_table(&path, &mut df).unwrap();

        let back = read_table(&path).unwrap();
        assert!(back.equals(&df));
        assert_eq!(back.column("Time Spent (seconds)").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn reading_garbage_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.parquet");
        std::fs::write(&path, b"not a parquet file").unwrap();
        assert!(read_table(&path).is_err());
    }
}
