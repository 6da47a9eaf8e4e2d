//! PostgreSQL product sink
//!
//! Each record is upserted through the `saveIceCatProductMeta(bigint, jsonb)` stored
//! procedure, which is keyed on the product id. One batch is one transaction. The
//! connection is owned by the run and never pooled.

use async_trait::async_trait;
use icecat_common::{IngestError, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::types::Json;
use sqlx::Connection;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::loader::{BatchEntry, BatchSink};

/// Upsert keyed on the product id
pub const SAVE_PRODUCT_SQL: &str = r#"select "saveIceCatProductMeta"($1, $2)"#;

/// Open a dedicated connection with `search_path` set to the configured schema
pub async fn connect(config: &DatabaseConfig) -> Result<PgConnection> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| IngestError::config("DATABASE_URL must be set"))?;

    let options = PgConnectOptions::from_str(url)
        .map_err(|e| IngestError::config(format!("Invalid DATABASE_URL: {e}")))?
        .options([("search_path", config.schema.as_str())]);

    let conn = tokio::time::timeout(config.connect_timeout(), PgConnection::connect_with(&options))
        .await
        .map_err(|_| {
            IngestError::database(format!(
                "Timed out connecting after {}s",
                config.connect_timeout_secs
            ))
        })?
        .map_err(|e| IngestError::database(format!("Failed to connect: {e}")))?;

    info!(schema = %config.schema, "Connected to database");
    Ok(conn)
}

/// `SELECT version()`
pub async fn server_version(conn: &mut PgConnection) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(conn)
        .await
        .map_err(|e| IngestError::database(e.to_string()))
}

/// Product ids must be integers; anything else means the file is not what we expect
pub fn parse_product_id(identity: &str, line: u64) -> Result<i64> {
    identity
        .parse::<i64>()
        .map_err(|e| IngestError::IdentityParse {
            value: identity.to_string(),
            line,
            reason: e.to_string(),
        })
}

pub struct PgProductSink {
    conn: PgConnection,
}

impl PgProductSink {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    pub fn into_inner(self) -> PgConnection {
        self.conn
    }
}

#[async_trait]
impl BatchSink for PgProductSink {
    type Key = i64;

    fn parse_key(&self, identity: &str, line: u64) -> Result<i64> {
        parse_product_id(identity, line)
    }

    async fn deliver(&mut self, batch: &[BatchEntry<i64>]) -> Result<()> {
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| IngestError::sink_write(format!("Failed to begin transaction: {e}")))?;

        for entry in batch {
            sqlx::query(SAVE_PRODUCT_SQL)
                .bind(entry.key)
                .bind(Json(&entry.record))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    IngestError::sink_write(format!(
                        "Upsert of product {} (line {}) failed: {e}",
                        entry.key,
                        entry.record.line()
                    ))
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| IngestError::sink_write(format!("Commit failed: {e}")))?;

        debug!(rows = batch.len(), "Committed batch");
        Ok(())
    }
}
