//! Staleness-aware cache of the catalog archive
//!
//! Two artifacts live side by side in the cache directory: the compressed archive as
//! downloaded and its decompressed TSV. Each is judged fresh or stale independently by
//! its modification time. A fresh TSV short-circuits everything; otherwise a fresh
//! archive is re-extracted; otherwise the archive is fetched first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use icecat_common::{IngestError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::extract::extract_gzip;

/// Remote archive plus the two local paths it is cached under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub compressed_path: PathBuf,
    pub decompressed_path: PathBuf,
    pub stale_after: Duration,
}

impl ArchiveDescriptor {
    /// Build a descriptor with both paths made absolute
    pub fn new(
        url: impl Into<String>,
        compressed_path: impl AsRef<Path>,
        decompressed_path: impl AsRef<Path>,
        stale_after: Duration,
    ) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            compressed_path: std::path::absolute(compressed_path)?,
            decompressed_path: std::path::absolute(decompressed_path)?,
            stale_after,
        })
    }

    /// `{dir}/{name}.gz` and `{dir}/{name}.csv`
    pub fn in_dir(
        url: impl Into<String>,
        dir: impl AsRef<Path>,
        name: &str,
        stale_after: Duration,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        Self::new(
            url,
            dir.join(format!("{name}.gz")),
            dir.join(format!("{name}.csv")),
            stale_after,
        )
    }

    fn ensure_parent_dirs(&self) -> io::Result<()> {
        for path in [&self.compressed_path, &self.decompressed_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Freshness of one cached artifact, computed from the filesystem on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheState {
    pub exists: bool,
    pub modified: Option<DateTime<Utc>>,
    pub is_stale: bool,
}

impl CacheState {
    /// Inspect `path` without touching it
    pub fn inspect(path: &Path, stale_after: Duration) -> io::Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    exists: false,
                    modified: None,
                    is_stale: true,
                })
            },
            Err(e) => return Err(e),
        };

        let modified = metadata.modified()?;
        // An mtime in the future counts as age zero
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        Ok(Self {
            exists: true,
            modified: Some(DateTime::<Utc>::from(modified)),
            is_stale: age > stale_after,
        })
    }

    /// Inspect `path` and delete it if it exists but has expired.
    ///
    /// The returned state still reports the file as stale, so callers refetch; a second
    /// call finds nothing to delete.
    pub fn evict_if_stale(path: &Path, stale_after: Duration) -> io::Result<Self> {
        let state = Self::inspect(path, stale_after)?;
        if state.exists && state.is_stale {
            info!(
                path = %path.display(),
                modified = ?state.modified,
                "Cached artifact expired, removing"
            );
            match std::fs::remove_file(path) {
                Ok(()) => {},
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => return Err(e),
            }
        }
        Ok(state)
    }
}

/// Something that can populate the compressed artifact
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Write the resource at `url` to `destination`, returning the byte count.
    ///
    /// Implementations must never leave a partial file at `destination`.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Fetch-or-reuse decisions for one archive
pub struct ArchiveCache<S> {
    source: S,
}

impl<S: ArchiveSource> ArchiveCache<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Path to a fresh decompressed file, fetching and extracting only as needed.
    ///
    /// Fetch and extract errors are returned unchanged; nothing is retried.
    pub async fn acquire(&self, descriptor: &ArchiveDescriptor) -> Result<PathBuf> {
        descriptor.ensure_parent_dirs()?;

        let csv_state =
            CacheState::evict_if_stale(&descriptor.decompressed_path, descriptor.stale_after)?;
        if !csv_state.is_stale {
            info!(
                path = %descriptor.decompressed_path.display(),
                modified = ?csv_state.modified,
                "Decompressed file is fresh, reusing"
            );
            return Ok(descriptor.decompressed_path.clone());
        }

        let gz_state =
            CacheState::evict_if_stale(&descriptor.compressed_path, descriptor.stale_after)?;
        if gz_state.is_stale {
            info!(url = %descriptor.url, "Compressed archive missing or expired, fetching");
            let size = self
                .source
                .fetch(&descriptor.url, &descriptor.compressed_path)
                .await?;
            debug!(bytes = size, "Archive fetched");
        } else {
            info!(
                path = %descriptor.compressed_path.display(),
                "Compressed archive is fresh, reusing"
            );
        }

        let compressed = descriptor.compressed_path.clone();
        let decompressed = descriptor.decompressed_path.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_gzip(&compressed, &decompressed))
            .await
            .map_err(|e| IngestError::Io(io::Error::other(format!("Extraction task failed: {e}"))))??;

        Ok(extracted.path)
    }
}
