//! Error types for the sluice-core crate.
//!
//! Uses `thiserror` with one enum per concern. Fatal stage failures surface
//! through [`IngestError`]; recoverable conditions (missing schema table,
//! unresolved dotted path) never reach this module and are logged instead.

use crate::schema::LogicalType;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for ingestion stages.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported format for '{location}': extension '{extension}' (supported: {supported})")]
    UnsupportedFormat {
        location: String,
        extension: String,
        supported: String,
    },

    #[error("Failed to load '{location}': {cause}")]
    Load {
        location: String,
        #[source]
        cause: FormatError,
    },

    #[error("Failed to save '{location}': {cause}")]
    Save {
        location: String,
        #[source]
        cause: FormatError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Failed to coerce table '{table}' from '{location}': {cause}")]
    Coerce {
        table: String,
        location: String,
        #[source]
        cause: CoercionError,
    },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl IngestError {
    pub fn load(location: impl Into<String>, cause: impl Into<FormatError>) -> Self {
        Self::Load {
            location: location.into(),
            cause: cause.into(),
        }
    }

    pub fn save(location: impl Into<String>, cause: impl Into<FormatError>) -> Self {
        Self::Save {
            location: location.into(),
            cause: cause.into(),
        }
    }

    pub fn coerce(
        table: impl Into<String>,
        location: impl Into<String>,
        cause: CoercionError,
    ) -> Self {
        Self::Coerce {
            table: table.into(),
            location: location.into(),
            cause,
        }
    }
}

/// Failures while decoding or encoding one tabular format.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl FormatError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

/// Errors from the HTTP data source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response from {url} has no 'results' array")]
    MissingResults { url: String },
}

/// Errors from reading or validating the schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema document {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },
}

/// An element that could not be converted to the column's declared type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot coerce column '{column}' to {target}: row {row} has value {value:?}")]
pub struct CoercionError {
    pub column: String,
    pub target: LogicalType,
    pub row: usize,
    pub value: String,
}

/// Structural violations of the columnar model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Cannot append {actual} values to {expected} column '{column}'")]
    KindMismatch {
        column: String,
        expected: String,
        actual: String,
    },
}

/// Errors from flushing a run artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid artifact key '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_message_names_location() {
        let err = IngestError::UnsupportedFormat {
            location: "data.xml".into(),
            extension: "xml".into(),
            supported: "csv, json".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("data.xml"));
        assert!(msg.contains("xml"));
    }

    #[test]
    fn test_load_error_wraps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err = IngestError::load("missing.csv", io);
        assert!(matches!(
            err,
            IngestError::Load {
                cause: FormatError::Io(_),
                ..
            }
        ));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_coerce_error_names_table_and_location() {
        let cause = CoercionError {
            column: "id".into(),
            target: LogicalType::Integer,
            row: 0,
            value: "abc".into(),
        };
        let err = IngestError::coerce("orders", "data/orders.csv", cause.clone());
        assert_eq!(
            err.to_string(),
            "Failed to coerce table 'orders' from 'data/orders.csv': \
             Cannot coerce column 'id' to integer: row 0 has value \"abc\""
        );
        assert_eq!(
            std::error::Error::source(&err).map(|e| e.to_string()),
            Some(cause.to_string())
        );
    }

    #[test]
    fn test_coercion_error_display() {
        let err = CoercionError {
            column: "count".into(),
            target: LogicalType::Integer,
            row: 3,
            value: "abc".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot coerce column 'count' to integer: row 3 has value \"abc\""
        );
    }
}
