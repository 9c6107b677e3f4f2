//! Configuration for Sluice runs.
//!
//! Uses `figment` for layered configuration: defaults -> `sluice.toml` in the
//! workspace -> an explicit config file -> `SLUICE_` environment variables
//! (nested keys separated by `__`, e.g. `SLUICE_ARTIFACT__KEY=nightly`).

use crate::format::{LoadOptions, SaveOptions};
use crate::pipeline::PipelineSpec;
use crate::source::SourceSpec;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the workspace directory.
pub const CONFIG_FILE_NAME: &str = "sluice.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SluiceConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub load: LoadOptions,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// YAML schema document.
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,
    /// Table applied to the run; none means no projection or coercion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
            table: None,
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config/schemas.yaml")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub spec: SourceSpec,
    /// Project file sources through the schema links.
    #[serde(default)]
    pub project: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination file; the extension picks the format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub options: SaveOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Key the run artifact is flushed under.
    #[serde(default = "default_artifact_key")]
    pub key: String,
    /// Directory receiving `<key>.json` and `<key>.md`.
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            key: default_artifact_key(),
            dir: default_artifact_dir(),
        }
    }
}

fn default_artifact_key() -> String {
    "sluice-run".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".sluice/artifacts")
}

impl SluiceConfig {
    /// Make relative paths relative to `workspace`.
    pub fn resolve_paths(mut self, workspace: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = workspace.join(&*path);
            }
        };
        resolve(&mut self.schema.path);
        if let SourceSpec::File { path } = &mut self.source.spec {
            resolve(path);
        }
        if let Some(path) = self.output.path.as_mut() {
            resolve(path);
        }
        resolve(&mut self.artifact.dir);
        self
    }

    pub fn pipeline_spec(&self) -> PipelineSpec {
        PipelineSpec {
            source: self.source.spec.clone(),
            table: self.schema.table.clone(),
            project: self.source.project,
            output: self.output.path.clone(),
            load: self.load.clone(),
            save: self.output.options.clone(),
        }
    }
}

/// Load configuration from defaults, workspace file, explicit file and environment.
///
/// A missing workspace file is skipped. Callers should check that `explicit`
/// exists first; figment treats a missing file as empty.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<SluiceConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SluiceConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("SLUICE_").split("__"));

    figment.extract().map_err(Box::new)
}
