//! In-memory columnar table shared by every ingestion stage.
//!
//! A [`TabularDataset`] is an ordered list of named [`Column`]s. Every column
//! holds the same number of elements; the constructor enforces this and stages
//! that rewrite columns preserve it.

use crate::error::DatasetError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Rendering used whenever a datetime leaves the typed representation.
pub const DATETIME_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// UTC timestamp for nanoseconds since the Unix epoch.
pub fn datetime_from_epoch_nanos(nanos: i64) -> NaiveDateTime {
    chrono::DateTime::from_timestamp_nanos(nanos).naive_utc()
}

/// Nanoseconds since the Unix epoch; `None` outside 1677-09-21..2262-04-11.
pub fn epoch_nanos(value: &NaiveDateTime) -> Option<i64> {
    value.and_utc().timestamp_nanos_opt()
}

/// Element type currently stored in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    String,
    DateTime,
    Boolean,
    /// Values not yet resolved to one logical type (nested JSON, mixed, all-null).
    Raw,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Boolean => "bool",
            Self::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Homogeneous, nullable column storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Boolean(Vec<Option<bool>>),
    Raw(Vec<Value>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            Self::Integer(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
            Self::DateTime(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Integer(_) => ColumnKind::Integer,
            Self::Float(_) => ColumnKind::Float,
            Self::String(_) => ColumnKind::String,
            Self::DateTime(_) => ColumnKind::DateTime,
            Self::Boolean(_) => ColumnKind::Boolean,
            Self::Raw(_) => ColumnKind::Raw,
        }
    }

    /// Empty storage of the given kind.
    pub fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Integer => Self::Integer(Vec::new()),
            ColumnKind::Float => Self::Float(Vec::new()),
            ColumnKind::String => Self::String(Vec::new()),
            ColumnKind::DateTime => Self::DateTime(Vec::new()),
            ColumnKind::Boolean => Self::Boolean(Vec::new()),
            ColumnKind::Raw => Self::Raw(Vec::new()),
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Self::Integer(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Float(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::String(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::DateTime(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Boolean(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Raw(v) => v.iter().filter(|x| x.is_null()).count(),
        }
    }

    /// Element `row` as a JSON value; `None` when out of bounds.
    ///
    /// Datetimes are rendered with [`DATETIME_DISPLAY_FORMAT`] and non-finite
    /// floats become `null`.
    pub fn json_value(&self, row: usize) -> Option<Value> {
        let value = match self {
            Self::Integer(v) => v.get(row)?.map(Value::from).unwrap_or(Value::Null),
            Self::Float(v) => v
                .get(row)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(v) => v
                .get(row)?
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
            Self::DateTime(v) => v
                .get(row)?
                .map(|dt| Value::String(dt.format(DATETIME_DISPLAY_FORMAT).to_string()))
                .unwrap_or(Value::Null),
            Self::Boolean(v) => v.get(row)?.map(Value::Bool).unwrap_or(Value::Null),
            Self::Raw(v) => v.get(row)?.clone(),
        };
        Some(value)
    }

    /// Element `row` as display text; `None` for null or out of bounds.
    ///
    /// Raw strings render without quotes, other raw values as compact JSON.
    pub fn display_value(&self, row: usize) -> Option<String> {
        match self {
            Self::Integer(v) => v.get(row)?.map(|x| x.to_string()),
            Self::Float(v) => v.get(row)?.map(|x| x.to_string()),
            Self::String(v) => v.get(row)?.clone(),
            Self::DateTime(v) => v
                .get(row)?
                .map(|dt| dt.format(DATETIME_DISPLAY_FORMAT).to_string()),
            Self::Boolean(v) => v.get(row)?.map(|b| b.to_string()),
            Self::Raw(v) => match v.get(row)? {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
        }
    }

    /// Append `other` in place. Both sides must hold the same kind.
    pub fn append(&mut self, column: &str, other: Self) -> Result<(), DatasetError> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.extend(b),
            (Self::Float(a), Self::Float(b)) => a.extend(b),
            (Self::String(a), Self::String(b)) => a.extend(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.extend(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.extend(b),
            (Self::Raw(a), Self::Raw(b)) => a.extend(b),
            (this, other) => {
                return Err(DatasetError::KindMismatch {
                    column: column.to_string(),
                    expected: this.kind().to_string(),
                    actual: other.kind().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build a column from loosely typed JSON values, inferring the narrowest kind.
    ///
    /// Nulls are ignored during inference. All integers give `Integer`; any mix
    /// of integers and floats gives `Float`; all booleans give `Boolean`; all
    /// strings give `String`. Anything else (objects, arrays, mixed kinds, or
    /// no non-null value at all) stays `Raw`.
    pub fn from_json_values(values: Vec<Value>) -> Self {
        match infer_kind(&values) {
            ColumnKind::Integer => {
                Self::Integer(values.iter().map(Value::as_i64).collect())
            }
            ColumnKind::Float => Self::Float(values.iter().map(Value::as_f64).collect()),
            ColumnKind::Boolean => Self::Boolean(values.iter().map(Value::as_bool).collect()),
            ColumnKind::String => Self::String(
                values
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            ColumnKind::DateTime | ColumnKind::Raw => Self::Raw(values),
        }
    }
}

/// Infer a column kind from a sample of JSON values.
pub fn infer_kind(values: &[Value]) -> ColumnKind {
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;
    let mut has_other = false;

    for v in values {
        match v {
            Value::Null => {}
            Value::Number(n) => {
                if n.is_i64() {
                    has_int = true;
                } else {
                    has_float = true;
                }
            }
            Value::Bool(_) => has_bool = true,
            Value::String(_) => has_string = true,
            Value::Array(_) | Value::Object(_) => has_other = true,
        }
    }

    let numeric = has_int || has_float;
    match (numeric, has_bool, has_string, has_other) {
        (true, false, false, false) if has_float => ColumnKind::Float,
        (true, false, false, false) => ColumnKind::Integer,
        (false, true, false, false) => ColumnKind::Boolean,
        (false, false, true, false) => ColumnKind::String,
        _ => ColumnKind::Raw,
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.data.kind()
    }
}

/// Ordered collection of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularDataset {
    columns: Vec<Column>,
}

impl TabularDataset {
    /// A dataset with zero columns and zero rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Build a dataset, rejecting ragged or duplicate columns.
    pub fn try_new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::new();
        let expected = columns.first().map(|c| c.data.len()).unwrap_or(0);
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
            let actual = column.data.len();
            if actual != expected {
                return Err(DatasetError::RaggedColumn {
                    column: column.name.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(Self { columns })
    }

    /// Rebuild from columns produced by an element-wise rewrite of an
    /// existing dataset, where names and lengths are already known to hold.
    pub(crate) fn from_rewritten(columns: Vec<Column>) -> Self {
        debug_assert!(Self::try_new(columns.clone()).is_ok());
        Self { columns }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when the dataset holds no rows (regardless of column count).
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Row `index` as an ordered JSON object.
    pub fn row_json(&self, index: usize) -> Option<serde_json::Map<String, Value>> {
        if index >= self.row_count() {
            return None;
        }
        let mut row = serde_json::Map::with_capacity(self.columns.len());
        for column in &self.columns {
            row.insert(
                column.name.clone(),
                column.data.json_value(index).unwrap_or(Value::Null),
            );
        }
        Some(row)
    }

    /// Build a dataset from JSON objects, one row per record.
    ///
    /// Columns are the union of keys in first-appearance order; a key missing
    /// from a record yields `null` for that row. Non-object records are rejected.
    pub fn from_json_records(records: &[Value]) -> Result<Self, DatasetError> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for record in records {
            if let Value::Object(map) = record {
                for key in map.keys() {
                    if seen.insert(key.clone()) {
                        names.push(key.clone());
                    }
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).cloned().unwrap_or(Value::Null))
                    .collect();
                Column::new(name, ColumnData::from_json_values(values))
            })
            .collect();
        Self::try_new(columns)
    }
}
