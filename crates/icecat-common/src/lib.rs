//! Icecat Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error taxonomy, logging setup and size formatting for the Icecat
//! ingestion workspace.
//!
//! - **Error Handling**: [`IngestError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber configuration ([`logging`])
//! - **Units**: human-readable byte sizes ([`units`])

pub mod error;
pub mod logging;
pub mod units;

// Re-export commonly used types
pub use error::{IngestError, Result};
