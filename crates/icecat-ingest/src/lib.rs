//! Icecat Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetch-cache-parse-load pipeline for the Icecat product catalog export.
//!
//! # Stages
//!
//! - **Cache** ([`cache`]): reuse fresh local artifacts, refetch expired ones
//! - **Fetch** ([`fetch`]): authenticated streaming download, atomic on disk
//! - **Extract** ([`extract`]): gzip to plain TSV, atomic on disk
//! - **Read** ([`reader`]): row count, then a lazy header-aware parse
//! - **Deliver** ([`loader`] + [`postgres`], or [`file_sink`])
//!
//! # Example
//!
//! ```no_run
//! use icecat_ingest::config::IngestConfig;
//! use icecat_ingest::pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let metrics = pipeline::export_to_files(&config, None).await;
//!     println!("{}", serde_json::to_string_pretty(&metrics.summary())?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod file_sink;
pub mod identity;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod postgres;
pub mod progress;
pub mod reader;
