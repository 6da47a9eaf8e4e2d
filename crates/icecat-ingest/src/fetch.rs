//! Authenticated HTTP download of the catalog archive

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use icecat_common::units::format_bytes;
use icecat_common::{IngestError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::ArchiveSource;
use crate::config::Credentials;

const USER_AGENT: &str = concat!("icecat-ingest/", env!("CARGO_PKG_VERSION"));

/// Streams the archive to disk with basic auth
pub struct RemoteFetcher {
    client: Client,
    credentials: Credentials,
}

impl RemoteFetcher {
    pub fn new(credentials: Credentials, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::transfer(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Download `url` into `destination`. The file only appears once the transfer is complete.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        info!(
            url = %url,
            username = %self.credentials.masked_username(),
            "Downloading archive"
        );

        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| IngestError::transfer(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IngestError::Authentication {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(IngestError::transfer(format!("HTTP {status} from {url}")));
        }

        let progress = download_bar(response.content_length(), destination);
        let written =
            write_stream_atomically(response.bytes_stream(), destination, &progress).await;
        progress.finish_and_clear();
        let written = written?;

        info!(
            path = %destination.display(),
            size = %format_bytes(written),
            "Download complete"
        );
        Ok(written)
    }
}

#[async_trait]
impl ArchiveSource for RemoteFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        RemoteFetcher::fetch(self, url, destination).await
    }
}

fn download_bar(total: Option<u64>, destination: &Path) -> ProgressBar {
    let pb = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    pb.set_message(format!("Downloading {name}"));
    pb
}

/// Drain `stream` into a temp file next to `destination`, then rename it into place.
///
/// Any error (including one yielded by the stream mid-transfer) drops the temp file, so
/// `destination` is either untouched or complete.
pub async fn write_stream_atomically<S, B, E>(
    stream: S,
    destination: &Path,
    progress: &ProgressBar,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".icecat-")
        .suffix(".part")
        .tempfile_in(parent)?;

    futures::pin_mut!(stream);
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| IngestError::transfer(format!("Stream interrupted: {e}")))?;
        let bytes = chunk.as_ref();
        temp.as_file_mut().write_all(bytes)?;
        written += bytes.len() as u64;
        progress.set_position(written);
    }

    temp.as_file_mut().sync_all()?;
    temp.persist(destination).map_err(|e| IngestError::Io(e.error))?;
    debug!(path = %destination.display(), bytes = written, "Persisted download");

    Ok(written)
}
