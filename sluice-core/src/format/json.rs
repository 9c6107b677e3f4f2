//! JSON documents holding an array of (possibly nested) objects.

use super::{LoadOptions, SaveOptions, TabularFormat};
use crate::dataset::TabularDataset;
use crate::error::FormatError;
use serde_json::Value;

/// JSON adapter (`.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl TabularFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    /// A top-level array is one record per element; a lone object is a single
    /// record. Nested values are kept as raw JSON columns.
    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<TabularDataset, FormatError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let mut records = match value {
            Value::Array(items) => items,
            Value::Object(_) => vec![value],
            _ => {
                return Err(FormatError::invalid_data(
                    "JSON must be an array of objects or a single object",
                ));
            }
        };
        if let Some(position) = records.iter().position(|r| !r.is_object()) {
            return Err(FormatError::invalid_data(format!(
                "JSON element {position} is not an object"
            )));
        }
        if let Some(max) = options.max_rows {
            records.truncate(max);
        }
        Ok(TabularDataset::from_json_records(&records)?)
    }

    fn encode(
        &self,
        dataset: &TabularDataset,
        options: &SaveOptions,
    ) -> Result<Vec<u8>, FormatError> {
        let rows: Vec<Value> = (0..dataset.row_count())
            .filter_map(|i| dataset.row_json(i).map(Value::Object))
            .collect();
        let bytes = if options.json_pretty {
            serde_json::to_vec_pretty(&rows)?
        } else {
            serde_json::to_vec(&rows)?
        };
        Ok(bytes)
    }
}
