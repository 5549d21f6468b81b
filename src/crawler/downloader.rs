//! Streaming image downloads
//!
//! Bodies are streamed chunk by chunk into `<destination>.part` through a
//! write buffer of `chunk_size` bytes and renamed into place only after the
//! last chunk was flushed. A destination path therefore either holds a
//! complete file or does not exist.

use crate::crawler::fetcher::Fetcher;
use crate::state::DownloadTicket;
use crate::DownloadError;
use futures::{Stream, StreamExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

/// Downloads claimed images into the output directory
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Fetcher,
    chunk_size: usize,
}

impl Downloader {
    pub fn new(fetcher: Fetcher, chunk_size: usize) -> Self {
        Self {
            fetcher,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Downloads one ticket and returns the number of bytes written
    ///
    /// Holds one budget permit from the first request until the file is
    /// renamed into place. On any error or on cancellation the partial file
    /// is removed.
    pub async fn download(
        &self,
        ticket: &DownloadTicket,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let url = ticket.url();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(url)),
            permit = self.fetcher.budget().acquire() => permit.map_err(|_| cancelled(url))?,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(url)),
            response = self.fetcher.send(url) => response?,
        };

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| DownloadError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })
        });

        let written = write_stream(url, body, ticket.destination(), self.chunk_size, cancel).await?;

        tracing::debug!(
            "Downloaded {} -> {} ({} bytes)",
            url,
            ticket.destination().display(),
            written
        );
        Ok(written)
    }
}

/// Writes `stream` to `destination` via a temporary `.part` file
///
/// A `.part` file left over from an earlier run is removed first; the new
/// one is then created exclusively.
pub async fn write_stream<S, B>(
    url: &str,
    stream: S,
    destination: &Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, DownloadError>>,
    B: AsRef<[u8]>,
{
    let part_path = part_path(destination);

    match fs::remove_file(&part_path).await {
        Ok(()) => tracing::debug!("Removed stale partial file {}", part_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(&part_path, e)),
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&part_path)
        .await
        .map_err(|e| io_error(&part_path, e))?;

    let guard = PartFile::new(part_path.clone());
    let mut writer = BufWriter::with_capacity(chunk_size, file);
    let mut written: u64 = 0;

    tokio::pin!(stream);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(url)),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let bytes = chunk.as_ref();
                writer
                    .write_all(bytes)
                    .await
                    .map_err(|e| io_error(&part_path, e))?;
                written += bytes.len() as u64;
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    writer.flush().await.map_err(|e| io_error(&part_path, e))?;
    let file = writer.into_inner();
    file.sync_all().await.map_err(|e| io_error(&part_path, e))?;
    drop(file);

    fs::rename(&part_path, destination)
        .await
        .map_err(|e| io_error(destination, e))?;
    guard.keep();

    Ok(written)
}

/// `<destination>.part`
fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn cancelled(url: &str) -> DownloadError {
    DownloadError::Cancelled {
        url: url.to_string(),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Removes the partial file when dropped unless [`PartFile::keep`] was called
///
/// Covers early returns as well as the whole download future being dropped
/// by a cancelled stage task.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove partial file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
