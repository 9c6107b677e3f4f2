//! Format-agnostic persistence of tabular data.

use crate::dataset::TabularDataset;
use crate::error::IngestError;
use crate::format::{FormatRegistry, SaveOptions};
use crate::loader::resolve_format;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes datasets, choosing the encoder by the destination's extension.
///
/// Writes go straight to the destination; an interrupted write can leave a
/// truncated file behind.
#[derive(Debug, Clone, Default)]
pub struct FormatWriter {
    registry: Arc<FormatRegistry>,
}

impl FormatWriter {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    /// Save `dataset` to `destination`, creating the parent directory.
    ///
    /// Returns `Ok(None)` without touching the filesystem when the dataset has
    /// no rows.
    pub async fn save(
        &self,
        dataset: &TabularDataset,
        destination: impl AsRef<Path>,
        options: &SaveOptions,
    ) -> Result<Option<PathBuf>, IngestError> {
        let destination = destination.as_ref();
        let location = destination.display().to_string();

        if dataset.is_empty() {
            tracing::warn!(destination = %location, "Dataset is empty, nothing saved");
            return Ok(None);
        }

        let format = resolve_format(&self.registry, &location)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::save(location.as_str(), e))?;
        }

        let bytes = format
            .encode(dataset, options)
            .map_err(|e| IngestError::save(location.as_str(), e))?;
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| IngestError::save(location.as_str(), e))?;

        tracing::info!(
            destination = %location,
            format = format.name(),
            rows = dataset.row_count(),
            bytes = bytes.len(),
            "Saved dataset"
        );
        Ok(Some(destination.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, ColumnData};
    use crate::format::LoadOptions;
    use crate::loader::FormatLoader;
    use tempfile::TempDir;

    fn one_row() -> TabularDataset {
        TabularDataset::try_new(vec![
            Column::new("id", ColumnData::Integer(vec![Some(1)])),
            Column::new("name", ColumnData::String(vec![Some("x".into())])),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out").join("nested").join("data.csv");

        let written = FormatWriter::default()
            .save(&one_row(), &dest, &SaveOptions::default())
            .await
            .unwrap();
        assert_eq!(written.as_deref(), Some(dest.as_path()));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "id,name\n1,x\n");
    }

    #[tokio::test]
    async fn test_empty_dataset_is_not_written() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("never").join("data.parquet");

        let written = FormatWriter::default()
            .save(&TabularDataset::empty(), &dest, &SaveOptions::default())
            .await
            .unwrap();
        assert!(written.is_none());
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_unsupported_destination() {
        let dir = TempDir::new().unwrap();
        let err = FormatWriter::default()
            .save(&one_row(), dir.path().join("data.xlsx"), &SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_pq_alias_round_trip() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("data.pq");
        let ds = one_row();

        FormatWriter::default()
            .save(&ds, &dest, &SaveOptions::default())
            .await
            .unwrap();
        let back = FormatLoader::default()
            .load(&dest, &LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(back, ds);
    }
}
