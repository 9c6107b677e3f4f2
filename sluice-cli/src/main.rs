//! Sluice CLI: run and inspect schema-driven ingestion pipelines.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Sluice: load, project, coerce and write tabular data
#[derive(Parser, Debug)]
#[command(name = "sluice", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds sluice.toml; relative paths resolve here)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path, merged over the workspace sluice.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Execute the configured pipeline and flush its run artifact
    Run {
        /// Skip writing the dataset and keep the artifact in memory
        #[arg(long)]
        dry_run: bool,
    },
    /// Load a file and print its columns, types and row count
    Inspect {
        /// csv, parquet/pq or json file
        file: PathBuf,
        /// Print the first N rows as JSON
        #[arg(long, default_value = "0")]
        head: usize,
    },
    /// Browse the schema document
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SchemaAction {
    /// List table names
    List,
    /// Print one table definition as YAML
    Show {
        /// Table name
        table: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default sluice.toml in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "sluice", "sluice")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sluice.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
