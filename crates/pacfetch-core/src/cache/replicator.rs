//! Best-effort replication of downloaded packages into auxiliary caches.
//!
//! Every scheduled copy runs as its own tokio task. Handles are kept until
//! [`CacheReplicator::join_all`], which the download pass awaits before it
//! reports completion.

use crate::config::PathsConfig;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::dirs::{ensure_cache_dir_async, is_same_dir};

/// Copies downloaded packages into auxiliary cache directories.
#[derive(Debug)]
pub struct CacheReplicator {
    targets: Vec<PathBuf>,
    tasks: Vec<JoinHandle<bool>>,
}

impl CacheReplicator {
    /// Create a replicator for the given auxiliary directories.
    ///
    /// The system package cache, the primary cache and duplicates are
    /// dropped, so each remaining directory has exactly one writer.
    pub fn new(aux_dirs: &[PathBuf], primary_dir: &Path) -> Self {
        Self::with_excluded(aux_dirs, primary_dir, Path::new(PathsConfig::SYSTEM_PACKAGE_CACHE))
    }

    /// Like [`CacheReplicator::new`] with a custom system cache path.
    pub fn with_excluded(aux_dirs: &[PathBuf], primary_dir: &Path, system_cache: &Path) -> Self {
        let mut targets: Vec<PathBuf> = Vec::new();
        for dir in aux_dirs {
            if is_same_dir(dir, system_cache) || is_same_dir(dir, primary_dir) {
                debug!("Not replicating into {}", dir.display());
                continue;
            }
            if targets.iter().any(|t| is_same_dir(t, dir)) {
                continue;
            }
            targets.push(dir.clone());
        }

        Self {
            targets,
            tasks: Vec::new(),
        }
    }

    /// Directories that receive copies.
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Number of copy tasks not yet joined.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn one copy task per target directory for `origin`.
    ///
    /// Returns the number of tasks spawned.
    pub fn schedule(&mut self, origin: &Path) -> usize {
        let Some(file_name) = origin.file_name() else {
            warn!("Can't replicate {}: no file name", origin.display());
            return 0;
        };

        for target in &self.targets {
            let origin = origin.to_path_buf();
            let target_dir = target.clone();
            let destination = target.join(file_name);

            self.tasks.push(tokio::spawn(async move {
                copy_to_cache(&origin, &target_dir, &destination).await
            }));
        }

        self.targets.len()
    }

    /// Wait for every scheduled copy.
    ///
    /// Returns the number of copies that succeeded.
    pub async fn join_all(&mut self) -> usize {
        let tasks = std::mem::take(&mut self.tasks);
        if tasks.is_empty() {
            return 0;
        }

        debug!("Waiting for {} cache copies", tasks.len());
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|result| match result {
                Ok(copied) => *copied,
                Err(e) => {
                    warn!("Cache copy task failed: {}", e);
                    false
                }
            })
            .count()
    }
}

async fn copy_to_cache(origin: &Path, target_dir: &Path, destination: &Path) -> bool {
    if let Err(e) = ensure_cache_dir_async(target_dir).await {
        debug!("Can't prepare {}: {}", target_dir.display(), e);
        return false;
    }

    match tokio::fs::copy(origin, destination).await {
        Ok(_) => {
            debug!("Copied {} to {}", origin.display(), destination.display());
            true
        }
        Err(e) => {
            debug!(
                "Error copying {} to {}: {}",
                origin.display(),
                destination.display(),
                e
            );
            false
        }
    }
}
