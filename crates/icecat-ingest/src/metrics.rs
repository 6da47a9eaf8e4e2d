//! Per-run counters and the summary handed back to the caller

use icecat_common::IngestError;
use serde::Serialize;
use std::path::PathBuf;

use crate::reader::Record;

/// Which sink the run delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Database,
    Files,
}

/// Mutable accumulator for one run. Never persisted.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub sink: SinkKind,
    /// Pass-one count, the progress denominator
    pub rows_found: u64,
    /// Data lines seen in pass two, skipped ones included
    pub rows_processed: u64,
    /// Arity mismatches
    pub rows_skipped: u64,
    /// Rows committed to the database, or files written
    pub rows_delivered: u64,
    pub first_example: Option<Record>,
    pub example_file: Option<PathBuf>,
    pub error: Option<String>,
    pub id_column: String,
    pub progress_interval: u64,
    pub batch_size: Option<usize>,
    pub output_dir: Option<PathBuf>,
}

impl RunMetrics {
    pub fn new(sink: SinkKind, id_column: impl Into<String>, progress_interval: u64) -> Self {
        Self {
            sink,
            rows_found: 0,
            rows_processed: 0,
            rows_skipped: 0,
            rows_delivered: 0,
            first_example: None,
            example_file: None,
            error: None,
            id_column: id_column.into(),
            progress_interval,
            batch_size: None,
            output_dir: None,
        }
    }

    /// Keep the first valid record for diagnostics
    pub fn observe(&mut self, record: &Record) {
        if self.first_example.is_none() {
            self.first_example = Some(record.clone());
        }
    }

    /// Record a fatal error; the counts accumulated so far are kept
    pub fn fail(&mut self, err: &IngestError) {
        self.error = Some(err.to_string());
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn summary(&self) -> RunSummary {
        let (rows_inserted, files_generated) = match self.sink {
            SinkKind::Database => (Some(self.rows_delivered), None),
            SinkKind::Files => (None, Some(self.rows_delivered)),
        };

        RunSummary {
            rows_found: self.rows_found,
            rows_processed: self.rows_processed,
            rows_skipped: self.rows_skipped,
            rows_inserted,
            files_generated,
            data_example: self.first_example.clone(),
            example_file: self.example_file.clone(),
            output_dir: self.output_dir.clone(),
            id_column: self.id_column.clone(),
            progress_interval: self.progress_interval,
            batch_size: self.batch_size,
            error: self.error.clone(),
        }
    }
}

/// Serializable run result
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rows_found: u64,
    pub rows_processed: u64,
    pub rows_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_inserted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_generated: Option<u64>,
    pub data_example: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub id_column: String,
    pub progress_interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub error: Option<String>,
}
