//! Declarative table schemas and their registry.
//!
//! A schema document is YAML of the form:
//!
//! ```yaml
//! datamodel:
//!   tables:
//!     - name: raw_launches
//!       columns:
//!         - name: launch_id
//!           type: string
//!           link: id
//!         - name: country
//!           type: string
//!           link: pad.country.name
//! ```
//!
//! `link` is the dotted path used by the projector; `type` drives coercion.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Coercion target vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Float,
    String,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "bool", alias = "boolean")]
    Boolean,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Boolean => "bool",
        };
        f.write_str(name)
    }
}

/// One output column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    /// Dotted path into a nested source record.
    #[serde(
        default,
        rename = "link",
        alias = "source_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_path: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            source_path: None,
        }
    }

    pub fn linked(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// A named table definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(rename = "name")]
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

impl SchemaDefinition {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// Schema with no columns, returned for unknown tables.
    pub fn empty(table_name: impl Into<String>) -> Self {
        Self::new(table_name, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Output name → dotted source path, in schema order, for linked columns only.
    pub fn link_map(&self) -> Vec<(&str, &str)> {
        self.columns
            .iter()
            .filter_map(|c| c.source_path.as_deref().map(|p| (c.name.as_str(), p)))
            .collect()
    }

    pub fn has_links(&self) -> bool {
        self.columns.iter().any(|c| c.source_path.is_some())
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.table_name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    datamodel: DataModel,
}

#[derive(Debug, Deserialize)]
struct DataModel {
    #[serde(default)]
    tables: Vec<SchemaDefinition>,
}

/// Parsed schema document with lookup by table name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    origin: String,
    tables: Vec<SchemaDefinition>,
}

impl SchemaRegistry {
    /// Read and parse a schema document from disk.
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, &path.display().to_string())
    }

    /// Parse a schema document held in memory. `origin` names it in errors and logs.
    pub fn from_yaml_str(content: &str, origin: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument =
            serde_yaml::from_str(content).map_err(|source| SchemaError::Parse {
                origin: origin.to_string(),
                source,
            })?;
        for table in &document.datamodel.tables {
            table.validate()?;
        }
        tracing::debug!(
            origin,
            tables = document.datamodel.tables.len(),
            "Parsed schema document"
        );
        Ok(Self {
            origin: origin.to_string(),
            tables: document.datamodel.tables,
        })
    }

    /// First table whose name matches exactly.
    pub fn find(&self, table_name: &str) -> Option<&SchemaDefinition> {
        self.tables.iter().find(|t| t.table_name == table_name)
    }

    /// Like [`find`](Self::find), but an unknown table yields an empty schema
    /// and a warning instead of `None`. Callers that need a schema must check
    /// [`SchemaDefinition::is_empty`].
    pub fn resolve(&self, table_name: &str) -> SchemaDefinition {
        match self.find(table_name) {
            Some(table) => table.clone(),
            None => {
                tracing::warn!(
                    table = table_name,
                    origin = %self.origin,
                    "Table not found in schema document"
                );
                SchemaDefinition::empty(table_name)
            }
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}
