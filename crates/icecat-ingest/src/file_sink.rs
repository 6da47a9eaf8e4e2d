//! One JSON document per product
//!
//! Unlike the database path, a record that cannot be written is logged and skipped;
//! only failures that prevent reading the stream end the run.

use icecat_common::{IngestError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::identity::{record_identity, sanitize_stem};
use crate::metrics::{RunMetrics, SinkKind};
use crate::progress::ProgressReporter;
use crate::reader::{Record, Row};

/// Writes `{output_dir}/icecat_{stem}.json`
#[derive(Debug, Clone)]
pub struct RecordFileSink {
    output_dir: PathBuf,
}

impl RecordFileSink {
    /// Ensure the output directory exists, first wiping it when `cleanup` is set
    pub fn prepare(output_dir: impl Into<PathBuf>, cleanup: bool) -> Result<Self> {
        let output_dir = output_dir.into();
        if cleanup && output_dir.exists() {
            info!(path = %output_dir.display(), "Removing previous output");
            if let Err(e) = std::fs::remove_dir_all(&output_dir) {
                warn!(path = %output_dir.display(), error = %e, "Could not remove output directory");
            }
        }
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.output_dir
            .join(format!("icecat_{}.json", sanitize_stem(identity)))
    }

    /// Write `record` as pretty JSON, replacing any file with the same stem
    pub fn write(&self, identity: &str, record: &Record) -> Result<PathBuf> {
        let path = self.path_for(identity);
        let file = File::create(&path)
            .map_err(|e| IngestError::sink_write(format!("{}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer
            .flush()
            .map_err(|e| IngestError::sink_write(format!("{}: {e}", path.display())))?;
        Ok(path)
    }
}

/// Drives a record stream into a [`RecordFileSink`]
#[derive(Debug, Clone)]
pub struct FileExporter {
    pub identity_column: String,
    pub progress_interval: u64,
}

impl FileExporter {
    pub fn new(identity_column: impl Into<String>, progress_interval: u64) -> Self {
        Self {
            identity_column: identity_column.into(),
            progress_interval,
        }
    }

    pub fn export<I>(&self, rows: I, rows_found: u64, sink: &RecordFileSink) -> RunMetrics
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let mut metrics =
            RunMetrics::new(SinkKind::Files, &self.identity_column, self.progress_interval);
        metrics.rows_found = rows_found;
        metrics.output_dir = Some(sink.output_dir().to_path_buf());

        let mut progress = ProgressReporter::new(rows_found, self.progress_interval);
        progress.start();

        let mut write_failures = 0u64;
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    error!(error = %e, rows_processed = metrics.rows_processed, "Export aborted");
                    metrics.fail(&e);
                    return metrics;
                },
            };
            metrics.rows_processed += 1;

            match row {
                Row::Skipped {
                    line,
                    expected,
                    found,
                } => {
                    metrics.rows_skipped += 1;
                    debug!(line, expected, found, "Skipping row with wrong field count");
                },
                Row::Record(record) => {
                    metrics.observe(&record);
                    let identity = record_identity(&record, &self.identity_column);
                    match sink.write(&identity, &record) {
                        Ok(path) => {
                            metrics.rows_delivered += 1;
                            if metrics.example_file.is_none() {
                                metrics.example_file = Some(path);
                            }
                        },
                        Err(e) => {
                            write_failures += 1;
                            warn!(line = record.line(), identity = %identity, error = %e, "Failed to write record");
                        },
                    }
                },
            }

            progress.tick(metrics.rows_processed);
        }

        progress.finish(metrics.rows_processed);
        info!(
            files_generated = metrics.rows_delivered,
            rows_skipped = metrics.rows_skipped,
            write_failures,
            output_dir = %sink.output_dir().display(),
            "Export complete"
        );
        metrics
    }
}
