//! Run-scoped provenance log.
//!
//! Stages append `info`/`data` pairs to a [`RunArtifact`] as they work. At the
//! end of a run the artifact is flushed to an [`ArtifactSink`] under a key and
//! starts over empty.

use crate::error::ArtifactError;
use crate::persistence::{atomic_write, atomic_write_json};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// One provenance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub info: String,
    pub data: String,
}

/// Snapshot handed to a sink and returned from [`RunArtifact::flush`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub key: String,
    pub entries: Vec<ArtifactEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

impl PersistedArtifact {
    pub fn new(key: impl Into<String>, entries: Vec<ArtifactEntry>) -> Self {
        Self {
            key: key.into(),
            entries,
            created_at: Utc::now(),
            location: None,
        }
    }

    /// Render as a two-column markdown table.
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "# {}\n\n_Created {}_\n\n| info | data |\n| --- | --- |\n",
            self.key,
            self.created_at.to_rfc3339()
        );
        for entry in &self.entries {
            out.push_str(&format!(
                "| {} | {} |\n",
                markdown_cell(&entry.info),
                markdown_cell(&entry.data)
            ));
        }
        out
    }
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}

/// Reject keys that are empty or contain anything besides ASCII letters,
/// digits, `-`, `_` and `.`.
pub fn validate_key(key: &str) -> Result<(), ArtifactError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidKey(key.to_string()))
    }
}

/// Destination for flushed artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(
        &self,
        key: &str,
        entries: &[ArtifactEntry],
    ) -> Result<PersistedArtifact, ArtifactError>;
}

/// Writes `<dir>/<key>.json` and a `<dir>/<key>.md` companion table.
#[derive(Debug, Clone)]
pub struct JsonFileArtifactSink {
    dir: PathBuf,
}

impl JsonFileArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for JsonFileArtifactSink {
    async fn persist(
        &self,
        key: &str,
        entries: &[ArtifactEntry],
    ) -> Result<PersistedArtifact, ArtifactError> {
        validate_key(key)?;
        let json_path = self.dir.join(format!("{key}.json"));
        let md_path = self.dir.join(format!("{key}.md"));

        let mut artifact = PersistedArtifact::new(key, entries.to_vec());
        artifact.location = Some(json_path.clone());

        // A JSON file on disk marks a complete artifact; it is written last.
        atomic_write(&md_path, artifact.to_markdown().as_bytes()).await?;
        if let Err(e) = atomic_write_json(&json_path, &artifact).await {
            let _ = tokio::fs::remove_file(&md_path).await;
            return Err(e.into());
        }

        tracing::debug!(key, path = %json_path.display(), "Artifact written");
        Ok(artifact)
    }
}

/// Keeps persisted artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    persisted: Mutex<Vec<PersistedArtifact>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far, oldest first.
    pub async fn persisted(&self) -> Vec<PersistedArtifact> {
        self.persisted.lock().await.clone()
    }

    /// Most recent artifact stored under `key`.
    pub async fn latest(&self, key: &str) -> Option<PersistedArtifact> {
        self.persisted
            .lock()
            .await
            .iter()
            .rev()
            .find(|a| a.key == key)
            .cloned()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn persist(
        &self,
        key: &str,
        entries: &[ArtifactEntry],
    ) -> Result<PersistedArtifact, ArtifactError> {
        validate_key(key)?;
        let artifact = PersistedArtifact::new(key, entries.to_vec());
        self.persisted.lock().await.push(artifact.clone());
        Ok(artifact)
    }
}

/// Ordered provenance entries for one run.
#[derive(Debug, Clone, Default)]
pub struct RunArtifact {
    entries: Vec<ArtifactEntry>,
}

impl RunArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, info: impl Into<String>, data: impl Into<String>) {
        let entry = ArtifactEntry {
            info: info.into(),
            data: data.into(),
        };
        tracing::debug!(info = %entry.info, data = %entry.data, "Artifact entry");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ArtifactEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist a snapshot under `key`, then reset to empty.
    ///
    /// Flushing with no entries persists an empty table. If the sink fails
    /// the entries are kept so the flush can be retried.
    pub async fn flush(
        &mut self,
        key: &str,
        sink: &dyn ArtifactSink,
    ) -> Result<PersistedArtifact, ArtifactError> {
        let persisted = sink.persist(key, &self.entries).await?;
        tracing::info!(key, entries = self.entries.len(), "Flushed run artifact");
        self.entries.clear();
        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct FailingSink;

    #[async_trait]
    impl ArtifactSink for FailingSink {
        async fn persist(
            &self,
            _key: &str,
            _entries: &[ArtifactEntry],
        ) -> Result<PersistedArtifact, ArtifactError> {
            Err(ArtifactError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("daily-load_2024.01").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("with space").is_err());
    }

    #[tokio::test]
    async fn test_flush_resets_entries() {
        let sink = MemoryArtifactSink::new();
        let mut artifact = RunArtifact::new();
        artifact.accumulate("Ingestion data from a.csv", "3 rows and 2 columns");
        artifact.accumulate("Saved", "out.parquet");

        let persisted = artifact.flush("run-1", &sink).await.unwrap();
        assert_eq!(persisted.entries.len(), 2);
        assert!(artifact.is_empty());

        // A second flush persists an empty table.
        let second = artifact.flush("run-1", &sink).await.unwrap();
        assert!(second.entries.is_empty());
        assert_eq!(sink.persisted().await.len(), 2);
        assert!(sink.latest("run-1").await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_entries() {
        let mut artifact = RunArtifact::new();
        artifact.accumulate("info", "data");
        assert!(artifact.flush("run", &FailingSink).await.is_err());
        assert_eq!(artifact.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_keeps_entries() {
        let mut artifact = RunArtifact::new();
        artifact.accumulate("info", "data");
        let err = artifact
            .flush("../escape", &MemoryArtifactSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidKey(_)));
        assert_eq!(artifact.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_sink_writes_json_and_markdown() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileArtifactSink::new(dir.path().join("artifacts"));
        let mut artifact = RunArtifact::new();
        artifact.accumulate("Columns", "a | b");

        let persisted = artifact.flush("nightly", &sink).await.unwrap();
        let json_path = dir.path().join("artifacts").join("nightly.json");
        assert_eq!(persisted.location.as_deref(), Some(json_path.as_path()));

        let back: PersistedArtifact =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(back.entries, persisted.entries);

        let md = std::fs::read_to_string(dir.path().join("artifacts").join("nightly.md")).unwrap();
        assert!(md.contains("| Columns | a \\| b |"));
    }

    #[tokio::test]
    async fn test_json_file_sink_leaves_no_partial_artifact() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileArtifactSink::new(dir.path());
        let mut artifact = RunArtifact::new();
        artifact.accumulate("Columns", "a");

        // A directory in place of the markdown file makes the first write fail.
        std::fs::create_dir(dir.path().join("blocked.md")).unwrap();
        assert!(artifact.flush("blocked", &sink).await.is_err());
        assert!(!dir.path().join("blocked.json").exists());
        assert_eq!(artifact.len(), 1);

        // A directory in place of the JSON file fails the second write.
        std::fs::create_dir(dir.path().join("late.json")).unwrap();
        assert!(artifact.flush("late", &sink).await.is_err());
        assert!(!dir.path().join("late.md").exists());
        assert_eq!(artifact.len(), 1);
    }
}
