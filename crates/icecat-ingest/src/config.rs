//! Ingestion configuration
//!
//! Loaded once at startup from the environment (after `.env` via `dotenvy`) and passed
//! down explicitly. CLI flags override individual values per run.

use icecat_common::{IngestError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::ArchiveDescriptor;

// ============================================================================
// Defaults
// ============================================================================

/// Icecat full-index export
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://data.icecat.biz/export/freexml.int/INT/files.index.csv.gz";

/// Directory holding the cached `.gz` and `.csv` artifacts
pub const DEFAULT_CACHE_DIR: &str = "/data/share/in";

/// Stem shared by both cache artifacts
pub const DEFAULT_ARCHIVE_NAME: &str = "icecat.data";

/// Cached artifacts older than this are refetched
pub const DEFAULT_STALE_AFTER_HOURS: u64 = 24;

/// Time allowed to establish the HTTP connection
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 90;

pub const DEFAULT_ID_COLUMN: &str = "product_id";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DB_PROGRESS_INTERVAL: u64 = 100_000;
pub const DEFAULT_FILES_PROGRESS_INTERVAL: u64 = 200_000;

/// Destination of the per-product JSON files
pub const DEFAULT_OUTPUT_DIR: &str = "/data/share/out/icecat/parsed";

pub const DEFAULT_DATABASE_SCHEMA: &str = "public";
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Basic-auth credentials for the export endpoint
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Username cut to its first 8 characters, safe for log lines
    pub fn masked_username(&self) -> String {
        let head: String = self.username.chars().take(8).collect();
        format!("{head}...")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.masked_username())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the archive comes from and where it is cached
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cache_dir: PathBuf,
    pub archive_name: String,
    pub stale_after_hours: u64,
    pub connect_timeout_secs: u64,
}

impl SourceConfig {
    /// Credentials for the export endpoint; both parts must be non-blank
    pub fn credentials(&self) -> Result<Credentials> {
        let username = self.username.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        if username.is_empty() || password.is_empty() {
            return Err(IngestError::config(
                "ICECAT_USERNAME and ICECAT_PASSWORD must both be set",
            ));
        }
        Ok(Credentials::new(username, password))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours.saturating_mul(3600))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Cache layout: `{cache_dir}/{archive_name}.gz` and `{cache_dir}/{archive_name}.csv`
    pub fn descriptor(&self) -> Result<ArchiveDescriptor> {
        ArchiveDescriptor::in_dir(
            &self.url,
            &self.cache_dir,
            &self.archive_name,
            self.stale_after(),
        )
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ARCHIVE_URL.to_string(),
            username: None,
            password: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// How rows are read and grouped
#[derive(Debug, Clone)]
pub struct ParseConfig {
    pub id_column: String,
    pub batch_size: usize,
    pub db_progress_interval: u64,
    pub files_progress_interval: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            id_column: DEFAULT_ID_COLUMN.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            db_progress_interval: DEFAULT_DB_PROGRESS_INTERVAL,
            files_progress_interval: DEFAULT_FILES_PROGRESS_INTERVAL,
        }
    }
}

/// Per-record JSON export
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// Remove and recreate `output_dir` before the first write
    pub cleanup: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cleanup: true,
        }
    }
}

/// Storage database connection
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    /// Applied as `search_path` on connect
    pub schema: String,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: DEFAULT_DATABASE_SCHEMA.to_string(),
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub source: SourceConfig,
    pub parse: ParseConfig,
    pub export: ExportConfig,
    pub database: DatabaseConfig,
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            source: SourceConfig {
                url: env_string("ICECAT_URL", DEFAULT_ARCHIVE_URL),
                username: std::env::var("ICECAT_USERNAME").ok(),
                password: std::env::var("ICECAT_PASSWORD").ok(),
                cache_dir: PathBuf::from(env_string("ICECAT_CACHE_DIR", DEFAULT_CACHE_DIR)),
                archive_name: env_string("ICECAT_ARCHIVE_NAME", DEFAULT_ARCHIVE_NAME),
                stale_after_hours: env_parse(
                    "ICECAT_STALE_AFTER_HOURS",
                    DEFAULT_STALE_AFTER_HOURS,
                )?,
                connect_timeout_secs: env_parse(
                    "ICECAT_CONNECT_TIMEOUT_SECS",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                )?,
            },
            parse: ParseConfig {
                id_column: env_string("ICECAT_ID_COLUMN", DEFAULT_ID_COLUMN),
                batch_size: env_parse("ICECAT_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                db_progress_interval: env_parse(
                    "ICECAT_DB_PROGRESS_INTERVAL",
                    DEFAULT_DB_PROGRESS_INTERVAL,
                )?,
                files_progress_interval: env_parse(
                    "ICECAT_FILES_PROGRESS_INTERVAL",
                    DEFAULT_FILES_PROGRESS_INTERVAL,
                )?,
            },
            export: ExportConfig {
                output_dir: PathBuf::from(env_string("ICECAT_OUTPUT_DIR", DEFAULT_OUTPUT_DIR)),
                cleanup: env_parse("ICECAT_CLEANUP", true)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
                schema: env_string("DATABASE_SCHEMA", DEFAULT_DATABASE_SCHEMA),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.url.is_empty() {
            return Err(IngestError::config("ICECAT_URL cannot be empty"));
        }
        if self.source.cache_dir.as_os_str().is_empty() {
            return Err(IngestError::config("ICECAT_CACHE_DIR cannot be empty"));
        }
        if self.source.archive_name.is_empty() {
            return Err(IngestError::config("ICECAT_ARCHIVE_NAME cannot be empty"));
        }
        if self.source.connect_timeout_secs == 0 {
            return Err(IngestError::config(
                "ICECAT_CONNECT_TIMEOUT_SECS must be greater than 0",
            ));
        }
        if self.parse.id_column.is_empty() {
            return Err(IngestError::config("ICECAT_ID_COLUMN cannot be empty"));
        }
        if self.parse.batch_size == 0 {
            return Err(IngestError::config("ICECAT_BATCH_SIZE must be greater than 0"));
        }
        if self.parse.db_progress_interval == 0 || self.parse.files_progress_interval == 0 {
            return Err(IngestError::config("Progress intervals must be greater than 0"));
        }
        if self.export.output_dir.as_os_str().is_empty() {
            return Err(IngestError::config("ICECAT_OUTPUT_DIR cannot be empty"));
        }
        if self.database.schema.is_empty() {
            return Err(IngestError::config("DATABASE_SCHEMA cannot be empty"));
        }
        Ok(())
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IngestError::config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.parse.batch_size, 1000);
        assert_eq!(config.parse.db_progress_interval, 100_000);
        assert_eq!(config.parse.files_progress_interval, 200_000);
        assert_eq!(config.source.stale_after(), Duration::from_secs(24 * 3600));
        assert_eq!(config.source.connect_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = IngestConfig::default();
        config.parse.batch_size = 0;
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_huge_stale_after_saturates() {
        let source = SourceConfig {
            stale_after_hours: u64::MAX,
            ..Default::default()
        };
        assert_eq!(source.stale_after(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_empty_directories_rejected() {
        let mut config = IngestConfig::default();
        config.source.cache_dir = PathBuf::new();
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));

        let mut config = IngestConfig::default();
        config.export.output_dir = PathBuf::new();
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_blank_credentials_rejected() {
        let mut source = SourceConfig::default();
        assert!(source.credentials().is_err());

        source.username = Some("   ".to_string());
        source.password = Some("secret".to_string());
        assert!(source.credentials().is_err());

        source.username = Some("shop-user".to_string());
        let creds = source.credentials().unwrap();
        assert_eq!(creds.username, "shop-user");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("averylongusername", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("averylon..."));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_descriptor_layout() {
        let source = SourceConfig {
            cache_dir: PathBuf::from("/var/cache/icecat"),
            ..Default::default()
        };
        let descriptor = source.descriptor().unwrap();
        assert_eq!(
            descriptor.compressed_path,
            PathBuf::from("/var/cache/icecat/icecat.data.gz")
        );
        assert_eq!(
            descriptor.decompressed_path,
            PathBuf::from("/var/cache/icecat/icecat.data.csv")
        );
    }
}
