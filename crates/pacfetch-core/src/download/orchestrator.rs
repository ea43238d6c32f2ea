//! Download pass over a work set.
//!
//! One sequential worker takes packages out of the [`DownloadWorkSet`],
//! satisfies each from the caches when possible and otherwise walks its
//! mirror list with a fixed back-off between attempts. Successful downloads
//! are replicated into auxiliary caches in the background; the pass joins
//! those copies before it returns.

use crate::cache::{CacheLocator, CacheLookup, CacheReplicator};
use crate::config::DownloadConfig;
use crate::events::{EventCategory, EventEmitter};
use crate::metalink::Metalink;
use crate::network::DynFetcher;
use crate::{PacfetchError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::work_set::DownloadWorkSet;

/// Counters for a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Packages in the work set when the pass started.
    pub total: usize,
    /// Packages already valid in the primary cache.
    pub primary_hits: usize,
    /// Packages copied from an auxiliary cache.
    pub aux_hits: usize,
    /// Packages fetched from a mirror.
    pub downloads: usize,
    /// Mirror attempts that failed, across all packages.
    pub failed_attempts: usize,
    /// Copies made into auxiliary caches.
    pub replicated: usize,
}

/// How a package left the work set.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PackageOutcome {
    Cached(CacheLookup),
    Downloaded { url: String, failed_attempts: usize },
}

/// Drives a download pass.
pub struct PackageDownloader {
    locator: CacheLocator,
    replicator: CacheReplicator,
    fetcher: DynFetcher,
    events: Arc<EventEmitter>,
    backoff: Duration,
}

impl PackageDownloader {
    pub fn new(config: &DownloadConfig, fetcher: DynFetcher, events: Arc<EventEmitter>) -> Self {
        let primary_dir = config.cache_dir().to_path_buf();
        Self {
            locator: CacheLocator::new(primary_dir.clone(), config.aux_cache_dirs.clone()),
            replicator: CacheReplicator::new(&config.aux_cache_dirs, &primary_dir),
            fetcher,
            events,
            backoff: config.mirror_backoff(),
        }
    }

    /// Make every package of `work_set` available in the primary cache.
    ///
    /// Stops at the first package whose mirrors are all exhausted; that
    /// package and every untouched one stay in `work_set`. Scheduled cache
    /// copies are awaited before returning in both cases.
    pub async fn run(&mut self, work_set: &mut DownloadWorkSet) -> Result<DownloadSummary> {
        let total = work_set.len();
        let mut summary = DownloadSummary {
            total,
            ..DownloadSummary::default()
        };

        self.events.add(EventCategory::DownloadsProgressBar, "show");
        self.events.downloads_percent(0.0);

        let mut downloaded = 0;
        let result = loop {
            let Some(metalink) = work_set.pop() else {
                break Ok(());
            };

            self.events.percent(0.0);
            self.events.info(format!(
                "Fetching {} {} ({}/{})...",
                metalink.identity,
                metalink.version,
                downloaded + 1,
                total
            ));

            match self.process(&metalink).await {
                Ok(outcome) => {
                    record(&mut summary, outcome);
                    downloaded += 1;
                    self.events.add(EventCategory::ProgressBarShowText, "");
                    self.events
                        .downloads_percent(downloaded as f64 / total as f64);
                }
                Err(e) => {
                    if let PacfetchError::MirrorsExhausted { attempts, .. } = &e {
                        summary.failed_attempts += attempts;
                    }
                    work_set.insert(metalink);
                    break Err(e);
                }
            }
        };

        // Copies must not outlive the pass
        summary.replicated = self.replicator.join_all().await;

        match result {
            Ok(()) => {
                self.events.add(EventCategory::DownloadsProgressBar, "hide");
                info!(
                    "Download pass complete: {} packages ({} cached, {} copied, {} downloaded)",
                    summary.total, summary.primary_hits, summary.aux_hits, summary.downloads
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    async fn process(&mut self, metalink: &Metalink) -> Result<PackageOutcome> {
        let lookup = self.locator.locate(metalink, &self.events).await;
        if lookup.is_satisfied() {
            return Ok(PackageOutcome::Cached(lookup));
        }

        let dst_path = self.locator.primary_path(metalink);
        let mut failed_attempts = 0;

        for url in &metalink.urls {
            let result = if url.is_empty() {
                Err(PacfetchError::EmptyMirrorUrl {
                    identity: metalink.identity.clone(),
                })
            } else {
                self.fetcher
                    .fetch(url, &dst_path, Some(metalink), &self.events)
                    .await
            };

            match result {
                Ok(_) => {
                    self.replicator.schedule(&dst_path);
                    return Ok(PackageOutcome::Downloaded {
                        url: url.clone(),
                        failed_attempts,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Giving up on {}: {}", metalink.identity, e);
                    return Err(e);
                }
                Err(e) => {
                    failed_attempts += 1;
                    if e.is_integrity_failure() {
                        warn!("Mirror {} served a bad copy of {}: {}", url, metalink.filename, e);
                    } else {
                        debug!("Can't download {} from {}: {}", metalink.filename, url, e);
                    }
                    self.events.info(format!(
                        "Error downloading {} from mirror {}. Trying next mirror...",
                        metalink.identity,
                        mirror_name(url)
                    ));
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }

        Err(PacfetchError::MirrorsExhausted {
            identity: metalink.identity.clone(),
            filename: metalink.filename.clone(),
            attempts: failed_attempts,
        })
    }
}

impl std::fmt::Debug for PackageDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageDownloader")
            .field("locator", &self.locator)
            .field("replicator", &self.replicator)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

fn record(summary: &mut DownloadSummary, outcome: PackageOutcome) {
    match outcome {
        PackageOutcome::Cached(CacheLookup::PrimaryHit) => summary.primary_hits += 1,
        PackageOutcome::Cached(_) => summary.aux_hits += 1,
        PackageOutcome::Downloaded {
            url,
            failed_attempts,
        } => {
            debug!("Downloaded from {}", url);
            summary.downloads += 1;
            summary.failed_attempts += failed_attempts;
        }
    }
}

/// Host part of a mirror url, for status lines.
fn mirror_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
