//! End-to-end jobs: acquire, parse, deliver
//!
//! Every job returns its counts even on failure. Errors raised before the first row is
//! delivered are folded into the same [`RunMetrics`] the loader would have produced.

use icecat_common::units::size_mb;
use icecat_common::{IngestError, Result};
use serde::Serialize;
use sqlx::Connection;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::cache::ArchiveCache;
use crate::config::IngestConfig;
use crate::fetch::RemoteFetcher;
use crate::file_sink::{FileExporter, RecordFileSink};
use crate::loader::BatchLoader;
use crate::metrics::{RunMetrics, SinkKind};
use crate::postgres::{self, PgProductSink};
use crate::reader::{count_rows, RecordStream};

/// Result of the download job
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub success: bool,
    pub size_mb: String,
}

/// Fetch, cache and extract the archive, returning the decompressed TSV
pub async fn acquire_csv(config: &IngestConfig) -> Result<PathBuf> {
    let credentials = config.source.credentials()?;
    let descriptor = config.source.descriptor()?;
    let fetcher = RemoteFetcher::new(credentials, config.source.connect_timeout())?;
    ArchiveCache::new(fetcher).acquire(&descriptor).await
}

/// Acquire the archive and report on the decompressed file
pub async fn download(config: &IngestConfig) -> Result<DownloadReport> {
    let path = acquire_csv(config).await?;
    let size = std::fs::metadata(&path)?.len();
    info!(path = %path.display(), size_mb = %size_mb(size), "Archive ready");
    Ok(DownloadReport {
        path,
        success: true,
        size_mb: size_mb(size),
    })
}

/// Load every valid row into PostgreSQL, one transaction per batch
pub async fn load_into_database(config: &IngestConfig, csv: Option<&Path>) -> RunMetrics {
    let loader = BatchLoader::new(
        &config.parse.id_column,
        config.parse.batch_size,
        config.parse.db_progress_interval,
    );

    let (rows_found, stream) = match open_source(config, csv).await {
        Ok(opened) => opened,
        Err(e) => return aborted(&loader_metrics(&loader), 0, e),
    };

    let conn = match postgres::connect(&config.database).await {
        Ok(conn) => conn,
        Err(e) => return aborted(&loader_metrics(&loader), rows_found, e),
    };

    let mut sink = PgProductSink::new(conn);
    let metrics = loader.load(stream, rows_found, &mut sink).await;

    if let Err(e) = sink.into_inner().close().await {
        warn!(error = %e, "Failed to close database connection cleanly");
    }
    metrics
}

/// Write one JSON file per valid row
pub async fn export_to_files(config: &IngestConfig, csv: Option<&Path>) -> RunMetrics {
    let exporter = FileExporter::new(&config.parse.id_column, config.parse.files_progress_interval);
    let mut template = RunMetrics::new(
        SinkKind::Files,
        &exporter.identity_column,
        exporter.progress_interval,
    );
    template.output_dir = Some(config.export.output_dir.clone());

    let (rows_found, stream) = match open_source(config, csv).await {
        Ok(opened) => opened,
        Err(e) => return aborted(&template, 0, e),
    };

    let sink = match RecordFileSink::prepare(&config.export.output_dir, config.export.cleanup) {
        Ok(sink) => sink,
        Err(e) => return aborted(&template, rows_found, e),
    };

    // Pass two and the file writes are synchronous
    let task = tokio::task::spawn_blocking(move || exporter.export(stream, rows_found, &sink));
    match task.await {
        Ok(metrics) => metrics,
        Err(e) => aborted(
            &template,
            rows_found,
            IngestError::Io(std::io::Error::other(format!("Export task failed: {e}"))),
        ),
    }
}

/// Resolve the TSV (local or acquired), run pass one and open pass two
async fn open_source(config: &IngestConfig, csv: Option<&Path>) -> Result<(u64, RecordStream)> {
    let path = match csv {
        Some(path) => {
            info!(path = %path.display(), "Using local file, skipping download");
            path.to_path_buf()
        },
        None => acquire_csv(config).await?,
    };

    let counted = path.clone();
    let rows_found = tokio::task::spawn_blocking(move || count_rows(&counted))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(format!("Row count task failed: {e}"))))??;
    info!(path = %path.display(), rows_found, "Counted rows");
    let stream = RecordStream::open(&path)?;
    Ok((rows_found, stream))
}

fn loader_metrics(loader: &BatchLoader) -> RunMetrics {
    let mut metrics = RunMetrics::new(
        SinkKind::Database,
        &loader.identity_column,
        loader.progress_interval,
    );
    metrics.batch_size = Some(loader.batch_size);
    metrics
}

fn aborted(template: &RunMetrics, rows_found: u64, err: IngestError) -> RunMetrics {
    error!(error = %err, kind = err.kind(), "Run aborted before streaming");
    let mut metrics = template.clone();
    metrics.rows_found = rows_found;
    metrics.fail(&err);
    metrics
}
