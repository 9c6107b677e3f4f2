//! Format adapters and extension-keyed dispatch.
//!
//! Each supported file format implements [`TabularFormat`]. The
//! [`FormatRegistry`] maps a normalised extension to its adapter, so adding a
//! format means registering one adapter.

pub mod csv;
pub mod json;
pub mod parquet;

pub use self::csv::CsvFormat;
pub use self::json::JsonFormat;
pub use self::parquet::ParquetFormat;

use crate::dataset::TabularDataset;
use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Options applied when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
    /// When false, CSV columns are named `column_1`, `column_2`, ...
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            csv_delimiter: default_delimiter(),
            has_header: true,
            max_rows: None,
        }
    }
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    None,
}

/// Options applied when encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
    #[serde(default)]
    pub parquet_compression: ParquetCompression,
    #[serde(default)]
    pub json_pretty: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            csv_delimiter: default_delimiter(),
            parquet_compression: ParquetCompression::default(),
            json_pretty: false,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

/// A tabular file format.
pub trait TabularFormat: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lower-case extensions (without the dot) handled by this format.
    fn extensions(&self) -> &'static [&'static str];

    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<TabularDataset, FormatError>;

    fn encode(
        &self,
        dataset: &TabularDataset,
        options: &SaveOptions,
    ) -> Result<Vec<u8>, FormatError>;
}

/// Lookup table from extension to format adapter.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Arc<dyn TabularFormat>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CsvFormat));
        registry.register(Arc::new(ParquetFormat));
        registry.register(Arc::new(JsonFormat));
        registry
    }
}

impl FormatRegistry {
    /// A registry with no formats. Use [`Default`] for csv/parquet/json.
    pub fn new() -> Self {
        Self {
            formats: BTreeMap::new(),
        }
    }

    /// Register an adapter under each of its extensions, replacing earlier entries.
    pub fn register(&mut self, format: Arc<dyn TabularFormat>) {
        for ext in format.extensions() {
            self.formats.insert(ext.to_ascii_lowercase(), format.clone());
        }
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn TabularFormat>> {
        self.formats.get(&extension.to_ascii_lowercase()).cloned()
    }

    /// Adapter for a file path or URL, keyed on its trailing extension.
    pub fn for_location(&self, location: &str) -> Option<Arc<dyn TabularFormat>> {
        extension_of(location).and_then(|ext| self.get(&ext))
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }
}

/// Normalised trailing extension of a path or URL.
///
/// Query strings and fragments are ignored, only the last path segment is
/// inspected, and the result is lower-cased. Returns `None` when the last
/// segment has no extension.
pub fn extension_of(location: &str) -> Option<String> {
    let path = location
        .split(['?', '#'])
        .next()
        .unwrap_or(location);
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("data.csv").as_deref(), Some("csv"));
        assert_eq!(extension_of("dir/DATA.Parquet").as_deref(), Some("parquet"));
        assert_eq!(extension_of("a.b/data.pq").as_deref(), Some("pq"));
        assert_eq!(
            extension_of("https://host/api/export.json?limit=3#top").as_deref(),
            Some("json")
        );
        assert_eq!(extension_of("C:\\data\\x.CSV").as_deref(), Some("csv"));
        assert_eq!(extension_of("no_extension"), None);
        assert_eq!(extension_of("dir.d/file"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_default_registry_dispatch() {
        let registry = FormatRegistry::default();
        assert_eq!(registry.for_location("x.csv").unwrap().name(), "csv");
        assert_eq!(registry.for_location("x.parquet").unwrap().name(), "parquet");
        assert_eq!(registry.for_location("x.pq").unwrap().name(), "parquet");
        assert_eq!(registry.for_location("x.JSON").unwrap().name(), "json");
        assert!(registry.for_location("data.xml").is_none());
        assert_eq!(
            registry.supported_extensions(),
            vec!["csv", "json", "parquet", "pq"]
        );
    }

    #[test]
    fn test_options_defaults_from_partial_input() {
        let load: LoadOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(load.csv_delimiter, ',');
        assert!(load.has_header);
        let save: SaveOptions = serde_json::from_str(r#"{"parquet_compression":"zstd"}"#).unwrap();
        assert_eq!(save.parquet_compression, ParquetCompression::Zstd);
    }
}
