//! One ingestion run: source → projection → coercion → write.

use crate::artifact::{ArtifactSink, PersistedArtifact, RunArtifact};
use crate::coerce::{CoercionReport, TypeCoercer};
use crate::dataset::TabularDataset;
use crate::error::{ArtifactError, IngestError};
use crate::format::{LoadOptions, SaveOptions};
use crate::loader::FormatLoader;
use crate::projector::FieldProjector;
use crate::schema::{SchemaDefinition, SchemaRegistry};
use crate::source::{HttpSource, SourceSpec};
use crate::writer::FormatWriter;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// What to ingest and where to put it.
#[derive(Debug, Clone, Default)]
pub struct PipelineSpec {
    pub source: SourceSpec,
    /// Schema table driving projection and coercion.
    pub table: Option<String>,
    /// Project file sources through the schema links. HTTP sources are always
    /// projected when the schema declares links.
    pub project: bool,
    /// Destination file; `None` skips the write stage.
    pub output: Option<PathBuf>,
    pub load: LoadOptions,
    pub save: SaveOptions,
}

/// Outcome of [`IngestPipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub table: Option<String>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub destination: Option<PathBuf>,
    pub coercion: Option<CoercionReport>,
}

/// Runs the ingestion stages and records each one in its [`RunArtifact`].
#[derive(Debug)]
pub struct IngestPipeline {
    registry: Arc<SchemaRegistry>,
    loader: FormatLoader,
    writer: FormatWriter,
    projector: FieldProjector,
    coercer: TypeCoercer,
    artifact: RunArtifact,
}

impl IngestPipeline {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            loader: FormatLoader::default(),
            writer: FormatWriter::default(),
            projector: FieldProjector,
            coercer: TypeCoercer,
            artifact: RunArtifact::new(),
        }
    }

    pub fn with_io(mut self, loader: FormatLoader, writer: FormatWriter) -> Self {
        self.loader = loader;
        self.writer = writer;
        self
    }

    pub fn artifact(&self) -> &RunArtifact {
        &self.artifact
    }

    pub fn artifact_mut(&mut self) -> &mut RunArtifact {
        &mut self.artifact
    }

    /// Execute one run. Artifact entries accumulate until [`finish`](Self::finish).
    pub async fn run(&mut self, spec: &PipelineSpec) -> Result<RunReport, IngestError> {
        let run_id = Uuid::new_v4();
        let location = spec.source.location();
        tracing::info!(%run_id, source = %location, "Starting ingestion run");

        let schema = self.schema_for(spec.table.as_deref());
        let dataset = self.ingest(spec, &schema, &location).await?;

        let (dataset, coercion) = if schema.is_empty() {
            (dataset, None)
        } else {
            let (dataset, report) = self
                .coercer
                .coerce_with_report(dataset, &schema)
                .map_err(|e| {
                    IngestError::coerce(schema.table_name.as_str(), location.as_str(), e)
                })?;
            self.artifact.accumulate(
                format!("Column types for {}", schema.table_name),
                report.summary(),
            );
            if !report.datetime_fallbacks.is_empty() {
                self.artifact.accumulate(
                    "Datetime columns kept as text",
                    report.datetime_fallbacks.join(", "),
                );
            }
            (dataset, Some(report))
        };

        let destination = match &spec.output {
            Some(output) => {
                let written = self.writer.save(&dataset, output, &spec.save).await?;
                match &written {
                    Some(path) => self.artifact.accumulate(
                        format!("Saved data to {}", path.display()),
                        format!("{} rows", dataset.row_count()),
                    ),
                    None => self.artifact.accumulate(
                        format!("Nothing saved to {}", output.display()),
                        "empty dataset",
                    ),
                }
                written
            }
            None => None,
        };

        tracing::info!(
            %run_id,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Ingestion run complete"
        );
        Ok(RunReport {
            run_id,
            source: location,
            table: spec.table.clone(),
            rows: dataset.row_count(),
            columns: dataset
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            destination,
            coercion,
        })
    }

    /// Flush the accumulated artifact under `key`.
    pub async fn finish(
        &mut self,
        key: &str,
        sink: &dyn ArtifactSink,
    ) -> Result<PersistedArtifact, ArtifactError> {
        self.artifact.flush(key, sink).await
    }

    fn schema_for(&mut self, table: Option<&str>) -> SchemaDefinition {
        let Some(table) = table else {
            return SchemaDefinition::default();
        };
        let schema = self.registry.resolve(table);
        if schema.is_empty() {
            self.artifact.accumulate(
                format!("Schema not found for {table}"),
                format!("no projection or coercion applied ({})", self.registry.origin()),
            );
        }
        schema
    }

    async fn ingest(
        &mut self,
        spec: &PipelineSpec,
        schema: &SchemaDefinition,
        location: &str,
    ) -> Result<TabularDataset, IngestError> {
        let dataset = match &spec.source {
            SourceSpec::File { path } => {
                let loaded = self.loader.load(path, &spec.load).await?;
                if spec.project && schema.has_links() {
                    self.projector.project_dataset(&loaded, schema)?
                } else {
                    loaded
                }
            }
            SourceSpec::Http(http) => {
                let mut records = HttpSource::from_spec(http).fetch().await?;
                if let Some(max) = spec.load.max_rows {
                    records.truncate(max);
                }
                if records.is_empty() {
                    tracing::warn!(source = %location, "No records returned");
                }
                if schema.has_links() {
                    self.projector.project(&records, schema)?
                } else {
                    TabularDataset::from_json_records(&records)?
                }
            }
        };

        self.artifact.accumulate(
            format!("Ingestion data from {location}"),
            format!(
                "{} rows and {} columns",
                dataset.row_count(),
                dataset.column_count()
            ),
        );
        Ok(dataset)
    }
}
