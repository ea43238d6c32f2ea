//! Mirror fetcher: streams one package file from one mirror.
//!
//! Provides:
//! - Streaming download with per-file progress events
//! - Verification of the downloaded bytes before they become visible
//! - Atomic file operations (temp file → final)

use crate::cache::ensure_cache_dir_async;
use crate::config::{DownloadConfig, NetworkConfig};
use crate::events::{format_progress_message, EventCategory, EventEmitter};
use crate::integrity::{self, Verification};
use crate::metalink::Metalink;
use crate::network::client::HttpClient;
use crate::{PacfetchError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Downloads a single url into a destination file.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url` into `destination`.
    ///
    /// When a metalink is given the downloaded bytes must match it before
    /// `destination` is touched. Returns the number of bytes written.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        metalink: Option<&Metalink>,
        events: &EventEmitter,
    ) -> Result<u64>;
}

/// Shared fetcher handle.
pub type DynFetcher = Arc<dyn Fetch>;

/// HTTP(S) implementation of [`Fetch`].
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    http: Arc<HttpClient>,
    /// Write buffer size.
    chunk_size: usize,
    /// Temp file suffix.
    temp_suffix: String,
}

impl MirrorFetcher {
    /// Create a fetcher with the timeout and proxies of `config`.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Ok(Self::with_client(Arc::new(HttpClient::from_config(config)?)))
    }

    /// Create a fetcher with a custom HTTP client.
    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            chunk_size: NetworkConfig::DOWNLOAD_CHUNK_SIZE,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
        }
    }

    /// Path the body is streamed into before it is verified.
    pub fn temp_path(&self, destination: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", destination.display(), self.temp_suffix))
    }

    async fn do_fetch(&self, url: &str, temp_path: &Path, events: &EventEmitter) -> Result<u64> {
        let response = self.http.get(url).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(PacfetchError::DownloadFailed {
                url: url.to_string(),
                message: format!("Download failed with status {}", status),
            });
        }

        let total_bytes = response.content_length().filter(|&total| total > 0);
        let file = tokio::fs::File::create(temp_path).await.map_err(|e| PacfetchError::Io {
            message: format!("Failed to create temp file: {}", e),
            path: Some(temp_path.to_path_buf()),
            source: Some(e),
        })?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut bytes_downloaded: u64 = 0;
        let mut percent = 0.0;
        let started = Instant::now();
        let mut stream = response.bytes_stream();

        events.percent(percent);

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                if e.is_timeout() {
                    PacfetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    PacfetchError::Network {
                        message: format!("Error reading download stream: {}", e),
                        source: Some(e),
                    }
                }
            })?;

            writer.write_all(&chunk).await.map_err(|e| PacfetchError::Io {
                message: format!("Failed to write to temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;

            bytes_downloaded += chunk.len() as u64;
            percent = next_progress(percent, bytes_downloaded, total_bytes);
            events.percent(percent);

            let elapsed = started.elapsed().as_secs_f64();
            let speed = if elapsed > 0.0 {
                bytes_downloaded as f64 / elapsed
            } else {
                0.0
            };
            events.add(
                EventCategory::ProgressBarShowText,
                format_progress_message(percent, speed),
            );
        }

        // Ensure data is flushed to disk
        writer.flush().await.map_err(|e| PacfetchError::Io {
            message: format!("Failed to flush temp file: {}", e),
            path: Some(temp_path.to_path_buf()),
            source: Some(e),
        })?;

        Ok(bytes_downloaded)
    }

    async fn check_download(
        &self,
        url: &str,
        temp_path: &Path,
        metalink: &Metalink,
        events: &EventEmitter,
    ) -> Result<()> {
        match integrity::verify_async(temp_path.to_path_buf(), metalink.clone()).await {
            Verification::Valid => Ok(()),
            Verification::Unverifiable => {
                events.add(
                    EventCategory::CachePkgsMd5CheckFailed,
                    metalink.identity.clone(),
                );
                Ok(())
            }
            Verification::Mismatch {
                expected, actual, ..
            } => Err(PacfetchError::IntegrityMismatch {
                url: url.to_string(),
                filename: metalink.filename.clone(),
                expected,
                actual,
            }),
            Verification::Unreadable(reason) => Err(PacfetchError::Io {
                message: format!("Can't verify downloaded file: {}", reason),
                path: Some(temp_path.to_path_buf()),
                source: None,
            }),
        }
    }
}

#[async_trait]
impl Fetch for MirrorFetcher {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        metalink: Option<&Metalink>,
        events: &EventEmitter,
    ) -> Result<u64> {
        // Ensure parent directory exists
        if let Some(parent) = destination.parent() {
            ensure_cache_dir_async(parent).await?;
        }

        let temp_path = self.temp_path(destination);

        let result = async {
            let bytes = self.do_fetch(url, &temp_path, events).await?;
            if let Some(metalink) = metalink {
                self.check_download(url, &temp_path, metalink, events).await?;
            }
            // Replaces any stale file left in the cache
            tokio::fs::rename(&temp_path, destination)
                .await
                .map_err(|e| PacfetchError::Io {
                    message: format!("Failed to move download to final destination: {}", e),
                    path: Some(destination.to_path_buf()),
                    source: Some(e),
                })?;
            Ok::<u64, PacfetchError>(bytes)
        }
        .await;

        match result {
            Ok(bytes) => {
                events.percent(1.0);
                debug!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                // Cleanup temp file on error
                let _ = tokio::fs::remove_file(&temp_path).await;
                if e.is_integrity_failure() {
                    warn!("{}", e);
                } else {
                    debug!("Fetching {} failed: {}", url, e);
                }
                Err(e)
            }
        }
    }
}

/// Per-file progress after a chunk.
///
/// With a known total this is the downloaded fraction rounded to two
/// decimals. Without one it advances a fixed step and stays below 1.0 until
/// the transfer ends.
fn next_progress(current: f64, bytes_downloaded: u64, total_bytes: Option<u64>) -> f64 {
    let next = match total_bytes {
        Some(total) => {
            let fraction = (bytes_downloaded as f64 / total as f64).min(1.0);
            (fraction * 100.0).round() / 100.0
        }
        None => (current + NetworkConfig::UNKNOWN_LENGTH_PROGRESS_STEP)
            .min(NetworkConfig::UNKNOWN_LENGTH_PROGRESS_CAP),
    };
    next.max(current)
}
