//! Cache directory helpers.

use crate::error::{PacfetchError, Result};
use std::path::Path;
use tracing::debug;

/// Create a cache directory (and its parents) if it doesn't exist yet.
///
/// # Platform Behavior
/// - **Linux/macOS**: New directories get mode 0o770 (owner and group only)
/// - **Windows**: Default permissions
///
/// Existing directories are left untouched.
pub fn ensure_cache_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(crate::config::PathsConfig::CACHE_DIR_MODE);
    }

    builder.create(path).map_err(|e| PacfetchError::Io {
        message: format!("Failed to create cache directory: {}", e),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;
    debug!("Created cache directory {}", path.display());
    Ok(())
}

/// Async variant of [`ensure_cache_dir`].
pub async fn ensure_cache_dir_async(path: &Path) -> Result<()> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || ensure_cache_dir(&owned))
        .await
        .map_err(|e| PacfetchError::Io {
            message: format!("Directory creation task failed: {}", e),
            path: Some(path.to_path_buf()),
            source: None,
        })?
}

/// Whether two paths name the same directory.
///
/// Falls back to a lexical comparison when either side can't be resolved.
pub fn is_same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
