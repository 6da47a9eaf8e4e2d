//! Icecat Ingest - catalog download and load tool

use anyhow::{bail, Result};
use clap::Parser;
use icecat_common::logging::{init_logging, LogConfig, LogLevel};
use icecat_ingest::config::IngestConfig;
use icecat_ingest::metrics::RunMetrics;
use icecat_ingest::{pipeline, postgres};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "icecat-ingest")]
#[command(author, version, about = "Icecat catalog ingestion tool")]
struct Cli {
    /// Job to run
    #[command(subcommand)]
    job: Job,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Job {
    /// Fetch and decompress the catalog archive, reusing fresh cached copies
    Download,

    /// Load the catalog into PostgreSQL
    LoadDb {
        /// Parse this decompressed file instead of downloading
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Rows per transaction
        #[arg(long, env = "ICECAT_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Column holding the product id
        #[arg(long, env = "ICECAT_ID_COLUMN")]
        id_column: Option<String>,
    },

    /// Write one JSON file per product
    ExportFiles {
        /// Parse this decompressed file instead of downloading
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, env = "ICECAT_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Keep existing files in the output directory
        #[arg(long)]
        no_cleanup: bool,

        /// Column holding the product id
        #[arg(long, env = "ICECAT_ID_COLUMN")]
        id_column: Option<String>,
    },

    /// Check connectivity to the storage database
    DbVersion,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("icecat-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env()?;

    match cli.job {
        Job::Download => {
            info!("Running download job");
            let report = pipeline::download(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Job::LoadDb {
            csv,
            batch_size,
            id_column,
        } => {
            if let Some(batch_size) = batch_size {
                config.parse.batch_size = batch_size;
            }
            if let Some(id_column) = id_column {
                config.parse.id_column = id_column;
            }
            config.validate()?;

            info!(
                id_column = %config.parse.id_column,
                batch_size = config.parse.batch_size,
                "Running database load job"
            );
            let metrics = pipeline::load_into_database(&config, csv.as_deref()).await;
            report(&metrics)?;
        },
        Job::ExportFiles {
            csv,
            output_dir,
            no_cleanup,
            id_column,
        } => {
            if let Some(output_dir) = output_dir {
                config.export.output_dir = output_dir;
            }
            if no_cleanup {
                config.export.cleanup = false;
            }
            if let Some(id_column) = id_column {
                config.parse.id_column = id_column;
            }
            config.validate()?;

            info!(
                output_dir = %config.export.output_dir.display(),
                cleanup = config.export.cleanup,
                "Running file export job"
            );
            let metrics = pipeline::export_to_files(&config, csv.as_deref()).await;
            report(&metrics)?;
        },
        Job::DbVersion => {
            let mut conn = postgres::connect(&config.database).await?;
            let version = postgres::server_version(&mut conn).await?;
            info!(version = %version, "Database reachable");
            println!("{version}");
        },
    }

    Ok(())
}

/// Print the run summary, failing the process if the run failed
fn report(metrics: &RunMetrics) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&metrics.summary())?);
    if let Some(error) = &metrics.error {
        bail!("Run failed: {error}");
    }
    info!("Ingestion complete");
    Ok(())
}
