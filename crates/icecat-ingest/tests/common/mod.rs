//! Shared helpers for icecat-ingest integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use icecat_ingest::config::IngestConfig;
use sqlx::{Connection, PgConnection};
use std::io::Write;
use std::path::Path;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// Header plus three data lines: one valid, one with an extra field, one without an id
pub const SAMPLE_TSV: &str = "product_id\tname\n1\tWidget\n2\tGadget\textra\n\tNoId\n";

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// Configuration rooted in a scratch directory
pub fn scratch_config(root: &Path) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.source.cache_dir = root.join("in");
    config.export.output_dir = root.join("out");
    config.source.username = Some("shop-user".to_string());
    config.source.password = Some("secret".to_string());
    config.source.connect_timeout_secs = 5;
    config
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,icecat_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// PostgreSQL container with the product upsert procedure installed
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pg = Self {
            _container: container,
            connection_string,
        };
        pg.install_schema().await?;
        Ok(pg)
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn connect(&self) -> Result<PgConnection> {
        PgConnection::connect(&self.connection_string)
            .await
            .context("Failed to connect to PostgreSQL")
    }

    async fn install_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;

        sqlx::query(
            r#"
            CREATE TABLE icecat_product_meta (
                product_id BIGINT PRIMARY KEY,
                meta JSONB NOT NULL
            )
            "#,
        )
        .execute(&mut conn)
        .await
        .context("Failed to create table")?;

        sqlx::query(
            r#"
            CREATE FUNCTION "saveIceCatProductMeta"(p_id BIGINT, p_meta JSONB)
            RETURNS VOID AS $$
                INSERT INTO icecat_product_meta (product_id, meta)
                VALUES (p_id, p_meta)
                ON CONFLICT (product_id) DO UPDATE SET meta = EXCLUDED.meta;
            $$ LANGUAGE sql
            "#,
        )
        .execute(&mut conn)
        .await
        .context("Failed to create upsert function")?;

        Ok(())
    }
}
