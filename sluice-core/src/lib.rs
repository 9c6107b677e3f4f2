//! # sluice-core: schema-driven tabular ingestion
//!
//! Loads tabular data from files (csv, parquet, json) or JSON APIs, flattens
//! nested records through dotted-path links declared in a YAML schema,
//! coerces column types per that schema, writes the result, and keeps a
//! run-scoped provenance log that is flushed once per run.
//!
//! ## Stages
//!
//! 1. [`FormatLoader`] / [`HttpSource`] produce a [`TabularDataset`]
//! 2. [`FieldProjector`] maps nested fields to schema columns
//! 3. [`TypeCoercer`] applies the schema's logical types
//! 4. [`FormatWriter`] persists the dataset
//!
//! Every stage appends to the [`RunArtifact`] owned by the [`IngestPipeline`].

// Data model
pub mod dataset;
pub mod error;
pub mod schema;

// Formats and IO
pub mod format;
pub mod loader;
pub mod persistence;
pub mod source;
pub mod writer;

// Transformations
pub mod coerce;
pub mod projector;

// Runs
pub mod artifact;
pub mod config;
pub mod pipeline;

// Re-exports
pub use artifact::{
    ArtifactEntry, ArtifactSink, JsonFileArtifactSink, MemoryArtifactSink, PersistedArtifact,
    RunArtifact,
};
pub use coerce::{CoercionReport, TypeCoercer, parse_datetime};
pub use config::{SluiceConfig, load_config};
pub use dataset::{Column, ColumnData, ColumnKind, TabularDataset};
pub use error::{
    ArtifactError, CoercionError, DatasetError, FetchError, FormatError, IngestError, SchemaError,
};
pub use format::{FormatRegistry, LoadOptions, ParquetCompression, SaveOptions, TabularFormat};
pub use loader::FormatLoader;
pub use pipeline::{IngestPipeline, PipelineSpec, RunReport};
pub use projector::{FieldProjector, resolve_path};
pub use schema::{ColumnSpec, LogicalType, SchemaDefinition, SchemaRegistry};
pub use source::{HttpSource, HttpSpec, SourceSpec};
pub use writer::FormatWriter;
