//! Package request and metalink types.

use crate::config::MetalinkConfig;
use serde::{Deserialize, Serialize};

/// A package the caller needs in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRequest {
    /// Package name as known to the package manager.
    pub identity: String,
    /// Optional version constraint, passed through to the resolver.
    pub version: Option<String>,
}

impl PackageRequest {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<&str> for PackageRequest {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl std::fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}{}", self.identity, version),
            None => write!(f, "{}", self.identity),
        }
    }
}

/// Expected digests for a package file (lowercase hex).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub sha256: Option<String>,
    pub md5: Option<String>,
}

impl FileHashes {
    pub fn sha256(digest: impl Into<String>) -> Self {
        Self {
            sha256: Some(digest.into().to_lowercase()),
            md5: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sha256.is_none() && self.md5.is_none()
    }
}

/// Resolved package descriptor: what to download and how to check it.
///
/// `urls` is in mirror priority order, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metalink {
    pub identity: String,
    pub version: String,
    pub filename: String,
    pub description: Option<String>,
    pub expected_size: Option<u64>,
    pub hashes: FileHashes,
    pub urls: Vec<String>,
}

impl Metalink {
    pub fn new(
        identity: impl Into<String>,
        version: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            version: version.into(),
            filename: filename.into(),
            description: None,
            expected_size: None,
            hashes: FileHashes::default(),
            urls: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.hashes.sha256 = Some(digest.into().to_lowercase());
        self
    }

    pub fn with_md5(mut self, digest: impl Into<String>) -> Self {
        self.hashes.md5 = Some(digest.into().to_lowercase());
        self
    }

    /// Set the candidate urls, keeping at most [`MetalinkConfig::MAX_URLS`].
    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls
            .into_iter()
            .map(Into::into)
            .take(MetalinkConfig::MAX_URLS)
            .collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_display() {
        assert_eq!(PackageRequest::new("bash").to_string(), "bash");
        assert_eq!(
            PackageRequest::new("bash").with_version(">=5.0").to_string(),
            "bash>=5.0"
        );
    }

    #[test]
    fn test_urls_truncated() {
        let urls = (0..20).map(|i| format!("http://mirror{}/pkg", i));
        let metalink = Metalink::new("pkg", "1", "pkg-1.tar.zst").with_urls(urls);
        assert_eq!(metalink.urls.len(), MetalinkConfig::MAX_URLS);
        assert_eq!(metalink.urls[0], "http://mirror0/pkg");
    }

    #[test]
    fn test_digests_lowercased() {
        let metalink = Metalink::new("pkg", "1", "pkg").with_sha256("ABCDEF");
        assert_eq!(metalink.hashes.sha256.as_deref(), Some("abcdef"));
        assert!(!metalink.hashes.is_empty());
        assert!(FileHashes::default().is_empty());
    }
}
