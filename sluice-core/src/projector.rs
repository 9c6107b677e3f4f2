//! Flatten nested records into schema-named columns.
//!
//! Each linked column of a [`SchemaDefinition`] names a dotted path such as
//! `pad.location.country_code`. The path is walked key by key through nested
//! JSON objects; a missing key or a non-object along the way yields `null` for
//! that row. Rows are never dropped and fields without a link are ignored.

use crate::dataset::{Column, ColumnData, TabularDataset};
use crate::error::DatasetError;
use crate::schema::SchemaDefinition;
use serde_json::Value;

/// Walk `path` (dot separated) into `record`.
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(record, |current, key| current.as_object()?.get(key))
}

/// Projects nested records onto the linked columns of a schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldProjector;

impl FieldProjector {
    /// Build one column per linked schema column, in schema order.
    ///
    /// Column kinds are inferred from the projected values. An empty `records`
    /// slice gives [`TabularDataset::empty`].
    pub fn project(
        &self,
        records: &[Value],
        schema: &SchemaDefinition,
    ) -> Result<TabularDataset, DatasetError> {
        if records.is_empty() {
            return Ok(TabularDataset::empty());
        }

        let links = schema.link_map();
        if links.is_empty() {
            tracing::warn!(
                table = %schema.table_name,
                "Schema declares no links, projection yields no columns"
            );
        }

        let mut columns = Vec::with_capacity(links.len());
        for (name, path) in links {
            let values: Vec<Value> = records
                .iter()
                .map(|r| resolve_path(r, path).cloned().unwrap_or(Value::Null))
                .collect();
            let misses = values.iter().filter(|v| v.is_null()).count();
            if misses > 0 {
                tracing::debug!(column = name, path, misses, "Unresolved or null values");
            }
            columns.push(Column::new(name, ColumnData::from_json_values(values)));
        }

        let dataset = TabularDataset::try_new(columns)?;
        tracing::info!(
            table = %schema.table_name,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Projected records"
        );
        Ok(dataset)
    }

    /// Project a loaded dataset whose rows hold nested values, such as a JSON
    /// file with object columns.
    pub fn project_dataset(
        &self,
        dataset: &TabularDataset,
        schema: &SchemaDefinition,
    ) -> Result<TabularDataset, DatasetError> {
        let records: Vec<Value> = (0..dataset.row_count())
            .filter_map(|i| dataset.row_json(i).map(Value::Object))
            .collect();
        self.project(&records, schema)
    }
}
