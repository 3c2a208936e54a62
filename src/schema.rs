use crate::structures::{GROUP_COLUMN, SUBGROUP_COLUMN};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const PRODUCTIVITY_COLUMN: &str = "Productivity";
const PEOPLE_COLUMN: &str = "Number of People";
const UNKNOWN_CATEGORY: &str = "unknown";

/// Value used to back-fill a column missing from an older file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillValue {
    Text(&'static str),
    Integer(i64),
}

impl FillValue {
    fn to_expr(&self) -> Expr {
        match self {
            FillValue::Text(s) => lit(*s),
            FillValue::Integer(v) => lit(*v),
        }
    }
}

/// Column-name policy deciding the default of a missing column.
///
/// Category tags default to "unknown", durations and the productivity score
/// to 0, the people count to 1, anything else to the empty string.
pub fn fill_value_for(column: &str) -> FillValue {
    if column == GROUP_COLUMN || column == SUBGROUP_COLUMN {
        FillValue::Text(UNKNOWN_CATEGORY)
    } else if column.to_lowercase().contains("seconds") || column == PRODUCTIVITY_COLUMN {
        FillValue::Integer(0)
    } else if column == PEOPLE_COLUMN {
        FillValue::Integer(1)
    } else {
        FillValue::Text("")
    }
}

/// Common dtype for a column seen with two different dtypes: integers stay
/// Int64, mixed numbers become Float64, anything else falls back to String.
pub fn widen(current: &DataType, seen: &DataType) -> DataType {
    let numeric = |d: &DataType| d.is_integer() || d.is_float();
    match (current, seen) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (a, b) if a.is_integer() && b.is_integer() => DataType::Int64,
        (a, b) if numeric(a) && numeric(b) => DataType::Float64,
        _ => DataType::String,
    }
}

/// Back-fill expression for a missing column, cast to the unified dtype.
/// A text default that cannot live in a non-text column becomes null.
fn fill_expr(column: &str, dtype: &DataType) -> Expr {
    let value = match fill_value_for(column) {
        FillValue::Text(s) if *dtype == DataType::String => lit(s),
        FillValue::Text(_) => lit(NULL).cast(dtype.clone()),
        FillValue::Integer(v) => lit(v).cast(dtype.clone()),
    };
    value.alias(column)
}

/// Union of columns across a set of tables, in first-seen order, with one
/// dtype per column wide enough for every table.
#[derive(Debug, Default, Clone)]
pub struct UnifiedSchema {
    columns: Vec<(String, DataType)>,
    index: HashMap<String, usize>,
}

impl UnifiedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, df: &DataFrame) {
        for column in df.get_columns() {
            let name = column.name().as_str();
            match self.index.get(name) {
                Some(&i) => {
                    let widened = widen(&self.columns[i].1, column.dtype());
                    if widened != self.columns[i].1 {
                        debug!(column=%name, from=%self.columns[i].1, to=%widened, "widening column type");
                        self.columns[i].1 = widened;
                    }
                }
                None => {
                    self.index.insert(name.to_string(), self.columns.len());
                    self.columns.push((name.to_string(), column.dtype().clone()));
                }
            }
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn dtype(&self, column: &str) -> Option<&DataType> {
        self.index.get(column).map(|&i| &self.columns[i].1)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Adds every missing column with its policy default, casts every column
    /// to its unified dtype and reorders to the unified order.
    pub fn conform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let present: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        let fills: Vec<Expr> = self
            .columns
            .iter()
            .filter(|(name, _)| !present.contains(name.as_str()))
            .map(|(name, dtype)| fill_expr(name, dtype))
            .collect();

        let mut lf = df.lazy();
        if !fills.is_empty() {
            lf = lf.with_columns(fills);
        }
        let ordered: Vec<Expr> = self
            .columns
            .iter()
            .map(|(name, dtype)| col(name.as_str()).cast(dtype.clone()))
            .collect();
        lf.select(ordered).collect()
    }
}
