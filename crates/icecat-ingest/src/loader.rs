//! Batched, transactional delivery of the record stream
//!
//! Records are grouped into batches of `batch_size` and handed to a [`BatchSink`] one
//! batch at a time; the sink commits each batch as a single unit. A key that the sink
//! cannot parse, or a failed delivery, ends the run. The error lands in the returned
//! [`RunMetrics`] together with the counts reached so far.

use async_trait::async_trait;
use icecat_common::Result;
use tracing::{debug, error, info};

use crate::identity::record_identity;
use crate::metrics::{RunMetrics, SinkKind};
use crate::progress::ProgressReporter;
use crate::reader::{Record, Row};

/// One record paired with its parsed sink key
#[derive(Debug, Clone)]
pub struct BatchEntry<K> {
    pub key: K,
    pub record: Record,
}

/// Destination that accepts whole batches atomically
#[async_trait]
pub trait BatchSink: Send {
    type Key: Send + Sync;

    /// Convert a record identity into the sink's key type. Failure is fatal to the run.
    fn parse_key(&self, identity: &str, line: u64) -> Result<Self::Key>;

    /// Commit all entries as one unit, or none of them
    async fn deliver(&mut self, batch: &[BatchEntry<Self::Key>]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct BatchLoader {
    pub identity_column: String,
    pub batch_size: usize,
    pub progress_interval: u64,
}

impl BatchLoader {
    pub fn new(identity_column: impl Into<String>, batch_size: usize, progress_interval: u64) -> Self {
        Self {
            identity_column: identity_column.into(),
            batch_size: batch_size.max(1),
            progress_interval,
        }
    }

    /// Drain `rows` into `sink`. `rows_found` is the pass-one count used for percentages.
    pub async fn load<I, S>(&self, rows: I, rows_found: u64, sink: &mut S) -> RunMetrics
    where
        I: IntoIterator<Item = Result<Row>>,
        S: BatchSink,
    {
        let mut metrics =
            RunMetrics::new(SinkKind::Database, &self.identity_column, self.progress_interval);
        metrics.rows_found = rows_found;
        metrics.batch_size = Some(self.batch_size);

        let mut progress = ProgressReporter::new(rows_found, self.progress_interval);
        progress.start();

        match self.drive(rows, sink, &mut metrics, &mut progress).await {
            Ok(()) => {
                progress.finish(metrics.rows_processed);
                info!(
                    rows_found = metrics.rows_found,
                    rows_processed = metrics.rows_processed,
                    rows_skipped = metrics.rows_skipped,
                    rows_inserted = metrics.rows_delivered,
                    "Batch load complete"
                );
            },
            Err(e) => {
                error!(
                    error = %e,
                    rows_processed = metrics.rows_processed,
                    rows_inserted = metrics.rows_delivered,
                    "Batch load aborted"
                );
                metrics.fail(&e);
            },
        }

        metrics
    }

    async fn drive<I, S>(
        &self,
        rows: I,
        sink: &mut S,
        metrics: &mut RunMetrics,
        progress: &mut ProgressReporter,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<Row>>,
        S: BatchSink,
    {
        let mut batch = Vec::with_capacity(self.batch_size);

        for row in rows {
            let row = row?;
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
                    let identity = record_identity(&record, &self.identity_column);
                    let key = sink.parse_key(&identity, record.line())?;
                    metrics.observe(&record);
                    batch.push(BatchEntry { key, record });

                    if batch.len() >= self.batch_size {
                        flush(sink, &mut batch, metrics).await?;
                    }
                },
            }

            progress.tick(metrics.rows_processed);
        }

        flush(sink, &mut batch, metrics).await
    }
}

async fn flush<S: BatchSink>(
    sink: &mut S,
    batch: &mut Vec<BatchEntry<S::Key>>,
    metrics: &mut RunMetrics,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    sink.deliver(batch.as_slice()).await?;
    metrics.rows_delivered += batch.len() as u64;
    debug!(size = batch.len(), total = metrics.rows_delivered, "Batch committed");
    batch.clear();
    Ok(())
}
