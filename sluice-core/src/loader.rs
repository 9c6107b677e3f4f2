//! Format-agnostic loading of tabular files.

use crate::dataset::TabularDataset;
use crate::error::IngestError;
use crate::format::{FormatRegistry, LoadOptions, TabularFormat, extension_of};
use std::path::Path;
use std::sync::Arc;

/// Reads tabular data, choosing the decoder by trailing extension.
#[derive(Debug, Clone, Default)]
pub struct FormatLoader {
    registry: Arc<FormatRegistry>,
}

impl FormatLoader {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Load the file at `source`.
    ///
    /// A file with zero data rows yields [`TabularDataset::empty`] and a
    /// warning rather than an error.
    pub async fn load(
        &self,
        source: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<TabularDataset, IngestError> {
        let source = source.as_ref();
        let location = source.display().to_string();
        let format = resolve_format(&self.registry, &location)?;

        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| IngestError::load(location.as_str(), e))?;
        decode(format.as_ref(), &location, &bytes, options)
    }

    /// Decode an already-fetched payload. `identifier` is the file name or URL
    /// it came from and selects the format.
    pub fn load_payload(
        &self,
        identifier: &str,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<TabularDataset, IngestError> {
        let format = resolve_format(&self.registry, identifier)?;
        decode(format.as_ref(), identifier, bytes, options)
    }
}

pub(crate) fn resolve_format(
    registry: &FormatRegistry,
    location: &str,
) -> Result<Arc<dyn TabularFormat>, IngestError> {
    registry
        .for_location(location)
        .ok_or_else(|| IngestError::UnsupportedFormat {
            location: location.to_string(),
            extension: extension_of(location).unwrap_or_default(),
            supported: registry.supported_extensions().join(", "),
        })
}

fn decode(
    format: &dyn TabularFormat,
    location: &str,
    bytes: &[u8],
    options: &LoadOptions,
) -> Result<TabularDataset, IngestError> {
    let dataset = format
        .decode(bytes, options)
        .map_err(|e| IngestError::load(location, e))?;

    if dataset.is_empty() {
        tracing::warn!(source = %location, format = format.name(), "No data rows loaded");
        return Ok(TabularDataset::empty());
    }

    tracing::info!(
        source = %location,
        format = format.name(),
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        "Loaded dataset"
    );
    Ok(dataset)
}
