//! Subcommand handlers.

use crate::{Commands, ConfigAction, SchemaAction};
use sluice_core::config::CONFIG_FILE_NAME;
use sluice_core::{
    FormatLoader, IngestPipeline, JsonFileArtifactSink, LoadOptions, MemoryArtifactSink,
    SchemaRegistry, SluiceConfig, load_config,
};
use std::path::Path;
use std::sync::Arc;

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { dry_run } => handle_run(workspace, config_path, dry_run).await,
        Commands::Inspect { file, head } => handle_inspect(workspace, &file, head).await,
        Commands::Schema { action } => handle_schema(action, workspace, config_path),
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load_settings(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<SluiceConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
    }
    let config = load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    Ok(config.resolve_paths(workspace))
}

async fn handle_run(
    workspace: &Path,
    config_path: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = load_settings(workspace, config_path)?;

    // The schema document is only required when a table is configured.
    let registry = if config.schema.table.is_some() {
        SchemaRegistry::from_path(&config.schema.path)?
    } else {
        SchemaRegistry::default()
    };

    let mut spec = config.pipeline_spec();
    if dry_run {
        spec.output = None;
    }

    let mut pipeline = IngestPipeline::new(Arc::new(registry));
    let report = match pipeline.run(&spec).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(source = %spec.source.location(), error = %e, "Pipeline run failed");
            return Err(e.into());
        }
    };
    tracing::info!(run_id = %report.run_id, rows = report.rows, "Pipeline run finished");

    let persisted = if dry_run {
        pipeline
            .finish(&config.artifact.key, &MemoryArtifactSink::new())
            .await?
    } else {
        pipeline
            .finish(
                &config.artifact.key,
                &JsonFileArtifactSink::new(&config.artifact.dir),
            )
            .await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    match &persisted.location {
        Some(location) => println!("Artifact written to {}", location.display()),
        None => print!("{}", persisted.to_markdown()),
    }
    Ok(())
}

async fn handle_inspect(workspace: &Path, file: &Path, head: usize) -> anyhow::Result<()> {
    let path = if file.is_relative() {
        workspace.join(file)
    } else {
        file.to_path_buf()
    };
    let dataset = FormatLoader::default()
        .load(&path, &LoadOptions::default())
        .await?;

    println!(
        "{}: {} rows, {} columns",
        path.display(),
        dataset.row_count(),
        dataset.column_count()
    );
    for column in dataset.columns() {
        println!(
            "  {:<24} {:<10} {} null",
            column.name,
            column.kind().to_string(),
            column.data.null_count()
        );
    }
    for row in (0..head.min(dataset.row_count())).filter_map(|i| dataset.row_json(i)) {
        println!("{}", serde_json::Value::Object(row));
    }
    Ok(())
}

fn handle_schema(
    action: SchemaAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_settings(workspace, config_path)?;
    let registry = SchemaRegistry::from_path(&config.schema.path)?;

    match action {
        SchemaAction::List => {
            let names = registry.table_names();
            if names.is_empty() {
                println!("No tables defined in {}", registry.origin());
            } else {
                println!("Tables in {} ({}):", registry.origin(), names.len());
                for name in names {
                    println!("  {name}");
                }
            }
            Ok(())
        }
        SchemaAction::Show { table } => {
            let Some(definition) = registry.find(&table) else {
                anyhow::bail!("Table '{}' not found in {}", table, registry.origin());
            };
            print!("{}", serde_yaml::to_string(definition)?);
            Ok(())
        }
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            std::fs::create_dir_all(workspace)?;
            let toml_str = toml::to_string_pretty(&SluiceConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_settings(workspace, config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
datamodel:
  tables:
    - name: orders
      columns:
        - { name: order_id, type: integer }
        - { name: amount, type: float }
        - { name: placed_at, type: datetime }
"#;

    fn workspace_with_run_config(dir: &Path) {
        std::fs::create_dir_all(dir.join("config")).unwrap();
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(dir.join("config").join("schemas.yaml"), SCHEMA).unwrap();
        std::fs::write(
            dir.join("data").join("orders.csv"),
            "order_id,amount,placed_at\n1,9.5,2024-03-01 10:00:00\n2,3,2024-03-02\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(CONFIG_FILE_NAME),
            r#"
[schema]
table = "orders"

[source]
kind = "file"
path = "data/orders.csv"

[output]
path = "out/orders.json"

[artifact]
key = "orders-run"
"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, dir.path(), None).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let parsed: SluiceConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, SluiceConfig::default());
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[artifact]\nkey = \"mine\"\n").unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, dir.path(), None).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[artifact]\nkey = \"mine\"\n"
        );
    }

    #[tokio::test]
    async fn test_missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        let err = handle_command(command, dir.path(), Some(&missing))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[tokio::test]
    async fn test_run_writes_output_and_artifact() {
        let dir = TempDir::new().unwrap();
        workspace_with_run_config(dir.path());

        handle_command(Commands::Run { dry_run: false }, dir.path(), None)
            .await
            .unwrap();

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out").join("orders.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written[0]["order_id"], 1);
        assert_eq!(written[1]["amount"], 3.0);
        assert_eq!(written[1]["placed_at"], "2024-03-02 00:00:00");

        let artifact_dir = dir.path().join(".sluice").join("artifacts");
        assert!(artifact_dir.join("orders-run.json").exists());
        assert!(artifact_dir.join("orders-run.md").exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        workspace_with_run_config(dir.path());

        handle_command(Commands::Run { dry_run: true }, dir.path(), None)
            .await
            .unwrap();
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join(".sluice").exists());
    }

    #[tokio::test]
    async fn test_schema_show_unknown_table_fails() {
        let dir = TempDir::new().unwrap();
        workspace_with_run_config(dir.path());

        let command = Commands::Schema {
            action: SchemaAction::Show {
                table: "nonexistent_table".into(),
            },
        };
        assert!(handle_command(command, dir.path(), None).await.is_err());

        let command = Commands::Schema {
            action: SchemaAction::List,
        };
        handle_command(command, dir.path(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_inspect_unsupported_file_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Inspect {
            file: "data.xml".into(),
            head: 0,
        };
        let err = handle_command(command, dir.path(), None).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported format"));
    }
}
