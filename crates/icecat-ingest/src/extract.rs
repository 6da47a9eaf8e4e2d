//! Gzip extraction to the canonical decompressed path

use flate2::read::MultiGzDecoder;
use icecat_common::units::format_bytes;
use icecat_common::{IngestError, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Decompress `compressed` into `destination` through a sibling temp file.
///
/// Undecodable input yields [`IngestError::CorruptArchive`]. On any failure the temp file
/// is removed and `destination` is left as it was.
pub fn extract_gzip(compressed: &Path, destination: &Path) -> Result<Extracted> {
    info!(
        source = %compressed.display(),
        destination = %destination.display(),
        "Decompressing archive"
    );

    let input = File::open(compressed)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));

    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix(".icecat-")
        .suffix(".extract")
        .tempfile_in(parent)?;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut bytes_written = 0u64;
    loop {
        let n = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(IngestError::CorruptArchive {
                    path: compressed.to_path_buf(),
                    source,
                })
            },
        };
        temp.as_file_mut().write_all(&buffer[..n])?;
        bytes_written += n as u64;
    }

    temp.as_file_mut().sync_all()?;
    temp.persist(destination).map_err(|e| IngestError::Io(e.error))?;

    info!(
        path = %destination.display(),
        size = %format_bytes(bytes_written),
        "Decompression complete"
    );

    Ok(Extracted {
        path: destination.to_path_buf(),
        bytes_written,
    })
}
