//! Column type coercion driven by a table schema.
//!
//! Conversions are element-wise and null-preserving. For `integer`, `float`,
//! `string` and `bool` the first element that cannot be converted aborts with
//! a [`CoercionError`]. A `datetime` column that fails to parse is kept as
//! text instead, with a warning.

use crate::dataset::{
    Column, ColumnData, DATETIME_DISPLAY_FORMAT, TabularDataset, datetime_from_epoch_nanos,
    epoch_nanos,
};
use crate::error::CoercionError;
use crate::schema::{LogicalType, SchemaDefinition};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Parse a timestamp. Accepted shapes, tried in order:
///
/// - RFC 3339 with offset (normalised to UTC)
/// - `2024-05-01T12:30:00[.fff]`
/// - `2024-05-01 12:30:00[.fff]`
/// - `2024-05-01` (midnight)
pub fn parse_datetime(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// What a coercion pass did to each schema column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    /// Columns now holding their declared type.
    pub converted: Vec<String>,
    /// Declared `datetime` columns kept as strings.
    pub datetime_fallbacks: Vec<String>,
    /// Schema columns absent from the dataset.
    pub missing: Vec<String>,
}

impl CoercionReport {
    pub fn summary(&self) -> String {
        format!(
            "{} converted, {} datetime fallbacks, {} missing",
            self.converted.len(),
            self.datetime_fallbacks.len(),
            self.missing.len()
        )
    }
}

/// Rewrites column types according to a schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCoercer;

impl TypeCoercer {
    pub fn coerce(
        &self,
        dataset: TabularDataset,
        schema: &SchemaDefinition,
    ) -> Result<TabularDataset, CoercionError> {
        self.coerce_with_report(dataset, schema).map(|(ds, _)| ds)
    }

    /// Coerce and describe what happened.
    ///
    /// Columns the schema does not list pass through unchanged; schema
    /// columns missing from the data are reported and skipped.
    pub fn coerce_with_report(
        &self,
        dataset: TabularDataset,
        schema: &SchemaDefinition,
    ) -> Result<(TabularDataset, CoercionReport), CoercionError> {
        let mut report = CoercionReport::default();
        for spec in &schema.columns {
            if dataset.column(&spec.name).is_none() {
                tracing::debug!(table = %schema.table_name, column = %spec.name, "Schema column not in data");
                report.missing.push(spec.name.clone());
            }
        }

        let mut columns = Vec::with_capacity(dataset.column_count());
        for column in dataset.into_columns() {
            let Some(spec) = schema.column(&column.name) else {
                columns.push(column);
                continue;
            };
            let Column { name, data } = column;
            let target = spec.logical_type;

            let data = match target {
                LogicalType::Integer => {
                    ColumnData::Integer(convert(&name, target, &data, to_integer)?)
                }
                LogicalType::Float => ColumnData::Float(convert(&name, target, &data, to_float)?),
                LogicalType::Boolean => {
                    ColumnData::Boolean(convert(&name, target, &data, to_bool)?)
                }
                LogicalType::String => ColumnData::String(to_strings(&data)),
                LogicalType::DateTime => match convert(&name, target, &data, to_datetime) {
                    Ok(values) => ColumnData::DateTime(values),
                    Err(failure) => {
                        tracing::warn!(
                            column = %name,
                            row = failure.row,
                            value = %failure.value,
                            "Datetime parse failed, keeping column as string"
                        );
                        report.datetime_fallbacks.push(name);
                        columns.push(Column {
                            name: failure.column,
                            data: ColumnData::String(to_strings(&data)),
                        });
                        continue;
                    }
                },
            };
            report.converted.push(name.clone());
            columns.push(Column::new(name, data));
        }

        tracing::info!(table = %schema.table_name, summary = %report.summary(), "Coerced columns");
        Ok((TabularDataset::from_rewritten(columns), report))
    }
}

/// A borrowed non-null element of any column kind.
#[derive(Debug, Clone, Copy)]
enum Cell<'a> {
    Int(i64),
    Float(f64),
    Str(&'a str),
    DateTime(NaiveDateTime),
    Bool(bool),
    Json(&'a Value),
}

impl fmt::Display for Cell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::DateTime(v) => write!(f, "{}", v.format(DATETIME_DISPLAY_FORMAT)),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

fn cell_at(data: &ColumnData, row: usize) -> Option<Cell<'_>> {
    match data {
        ColumnData::Integer(v) => v.get(row)?.map(Cell::Int),
        ColumnData::Float(v) => v.get(row)?.map(Cell::Float),
        ColumnData::String(v) => v.get(row)?.as_deref().map(Cell::Str),
        ColumnData::DateTime(v) => v.get(row)?.map(Cell::DateTime),
        ColumnData::Boolean(v) => v.get(row)?.map(Cell::Bool),
        ColumnData::Raw(v) => match v.get(row)? {
            Value::Null => None,
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Cell::Int)
                .or_else(|| n.as_f64().map(Cell::Float)),
            Value::String(s) => Some(Cell::Str(s)),
            other => Some(Cell::Json(other)),
        },
    }
}

fn convert<U>(
    column: &str,
    target: LogicalType,
    data: &ColumnData,
    f: impl Fn(Cell<'_>) -> Option<U>,
) -> Result<Vec<Option<U>>, CoercionError> {
    (0..data.len())
        .map(|row| match cell_at(data, row) {
            None => Ok(None),
            Some(cell) => f(cell).map(Some).ok_or_else(|| CoercionError {
                column: column.to_string(),
                target,
                row,
                value: cell.to_string(),
            }),
        })
        .collect()
}

fn integral(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    (value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64)
        .then_some(value as i64)
}

fn to_integer(cell: Cell<'_>) -> Option<i64> {
    match cell {
        Cell::Int(v) => Some(v),
        Cell::Float(v) => integral(v),
        Cell::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Cell::Bool(b) => Some(i64::from(b)),
        Cell::DateTime(dt) => epoch_nanos(&dt),
        Cell::Json(_) => None,
    }
}

fn to_float(cell: Cell<'_>) -> Option<f64> {
    match cell {
        Cell::Int(v) => Some(v as f64),
        Cell::Float(v) => Some(v),
        Cell::Str(s) => s.trim().parse().ok(),
        Cell::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        Cell::DateTime(_) | Cell::Json(_) => None,
    }
}

fn to_bool(cell: Cell<'_>) -> Option<bool> {
    match cell {
        Cell::Bool(b) => Some(b),
        Cell::Int(v) => Some(v != 0),
        Cell::Float(v) if v.is_nan() => None,
        Cell::Float(v) => Some(v != 0.0),
        Cell::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Cell::DateTime(_) | Cell::Json(_) => None,
    }
}

fn to_datetime(cell: Cell<'_>) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(dt),
        Cell::Str(s) => parse_datetime(s).ok(),
        Cell::Int(nanos) => Some(datetime_from_epoch_nanos(nanos)),
        Cell::Float(_) | Cell::Bool(_) | Cell::Json(_) => None,
    }
}

fn to_strings(data: &ColumnData) -> Vec<Option<String>> {
    (0..data.len()).map(|row| data.display_value(row)).collect()
}
