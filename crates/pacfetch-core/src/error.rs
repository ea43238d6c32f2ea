//! Error types for pacfetch.
//!
//! Cache validation problems are deliberately absent here: they are reported
//! as [`crate::integrity::Verification`] values so callers can fall through to
//! the next cache tier without unwinding.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pacfetch library.
#[derive(Debug, Error)]
pub enum PacfetchError {
    // Metadata errors
    #[error("Can't resolve package {identity}: {message}")]
    Metadata { identity: String, message: String },

    #[error("Invalid metalink document: {message}")]
    Metalink { message: String },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Hash mismatch for {filename} from {url}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        url: String,
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Package {identity} has an empty mirror url")]
    EmptyMirrorUrl { identity: String },

    #[error("Can't download {filename} ({identity}), even after trying {attempts} mirrors")]
    MirrorsExhausted {
        identity: String,
        filename: String,
        attempts: usize,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Installation-level failure wrapping the cause that stopped the pass.
    #[error("{message}")]
    Install {
        message: String,
        #[source]
        source: Option<Box<PacfetchError>>,
    },
}

/// Result type alias for pacfetch operations.
pub type Result<T> = std::result::Result<T, PacfetchError>;

impl From<std::io::Error> for PacfetchError {
    fn from(err: std::io::Error) -> Self {
        PacfetchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PacfetchError {
    fn from(err: serde_json::Error) -> Self {
        PacfetchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for PacfetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PacfetchError::Timeout {
                url: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }
        } else {
            PacfetchError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl PacfetchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PacfetchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap a failure into the installation-level error shown to the user.
    pub fn install(message: impl Into<String>, cause: PacfetchError) -> Self {
        PacfetchError::Install {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Whether this error justifies moving on to the next mirror.
    ///
    /// Local disk errors are included: a failed write into the cache may
    /// succeed on a later attempt once a partial file has been removed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PacfetchError::Network { .. }
                | PacfetchError::Timeout { .. }
                | PacfetchError::DownloadFailed { .. }
                | PacfetchError::IntegrityMismatch { .. }
                | PacfetchError::EmptyMirrorUrl { .. }
                | PacfetchError::Io { .. }
        )
    }

    /// Whether the transfer completed but delivered the wrong content.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, PacfetchError::IntegrityMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PacfetchError::MirrorsExhausted {
            identity: "linux".into(),
            filename: "linux-6.1-1-x86_64.pkg.tar.zst".into(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Can't download linux-6.1-1-x86_64.pkg.tar.zst (linux), even after trying 3 mirrors"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PacfetchError::Timeout {
            url: "http://mirror".into()
        }
        .is_retryable());
        assert!(PacfetchError::EmptyMirrorUrl {
            identity: "bash".into()
        }
        .is_retryable());
        assert!(!PacfetchError::Metadata {
            identity: "bash".into(),
            message: "unknown".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_integrity_failure_is_distinguishable() {
        let mismatch = PacfetchError::IntegrityMismatch {
            url: "http://mirror/a".into(),
            filename: "a".into(),
            expected: "00".into(),
            actual: "ff".into(),
        };
        let network = PacfetchError::DownloadFailed {
            url: "http://mirror/a".into(),
            message: "status 404".into(),
        };
        assert!(mismatch.is_integrity_failure());
        assert!(!network.is_integrity_failure());
        assert!(mismatch.is_retryable() && network.is_retryable());
    }

    #[test]
    fn test_install_keeps_cause() {
        let err = PacfetchError::install(
            "Can't download needed packages.",
            PacfetchError::Config {
                message: "bad".into(),
            },
        );
        assert_eq!(err.to_string(), "Can't download needed packages.");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Configuration error: bad"));
    }
}
