//! Centralized configuration for pacfetch.
//!
//! Constant holders describe the fixed tuning of the download engine; the
//! [`DownloadConfig`] struct is the per-run configuration a caller provides.
//! Optional collaborators (proxies, mirror ranking, auxiliary caches) are
//! always present and simply empty when disabled.

use crate::error::{PacfetchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Per-request timeout. Client defaults of several minutes would look
    /// like a stalled installation.
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
    /// Delay between two consecutive mirror attempts for the same package.
    pub const MIRROR_BACKOFF: Duration = Duration::from_secs(20);
    pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    /// Per-chunk progress step when the server sends no content length.
    pub const UNKNOWN_LENGTH_PROGRESS_STEP: f64 = 0.1;
    /// Highest progress reported before an unknown-length transfer ends.
    pub const UNKNOWN_LENGTH_PROGRESS_CAP: f64 = 0.99;
    pub const USER_AGENT: &'static str = "pacfetch/0.3";
}

/// Metalink-related configuration.
pub struct MetalinkConfig;

impl MetalinkConfig {
    pub const NAMESPACE: &'static str = "urn:ietf:params:xml:ns:metalink";
    /// Maximum candidate urls kept per package.
    pub const MAX_URLS: usize = 15;
    /// Priority given to mirrors absent from the ranking.
    pub const UNRANKED_PRIORITY: usize = 9999;
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    /// The package manager's own cache on the live medium. Never a
    /// replication target.
    pub const SYSTEM_PACKAGE_CACHE: &'static str = "/var/cache/pacman/pkg";
    pub const DEFAULT_PACMAN_CONF: &'static str = "/etc/pacman.conf";
    /// Owner and group only; caches are never world writable.
    pub const CACHE_DIR_MODE: u32 = 0o770;
    /// Limit for the hashing read buffer.
    pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;
}

/// Package manager configuration reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerConfig {
    /// Path to the package manager configuration file.
    pub conf_file: PathBuf,
    /// Primary cache directory, final location of every fetched package.
    pub cache_dir: PathBuf,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            conf_file: PathBuf::from(PathsConfig::DEFAULT_PACMAN_CONF),
            cache_dir: PathBuf::from(PathsConfig::SYSTEM_PACKAGE_CACHE),
        }
    }
}

/// Outbound proxy settings, protocol (`http`, `https` or `all`) to endpoint.
///
/// An empty map means no proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyConfig(pub BTreeMap<String, String>);

impl ProxyConfig {
    pub const PROTOCOLS: [&'static str; 3] = ["http", "https", "all"];

    /// Create a proxy configuration from `(protocol, endpoint)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        )
    }

    pub fn is_disabled(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reject unknown protocols and empty endpoints.
    pub fn validate(&self) -> Result<()> {
        for (protocol, endpoint) in self.iter() {
            if !Self::PROTOCOLS.contains(&protocol) {
                return Err(PacfetchError::Config {
                    message: format!(
                        "Unsupported proxy protocol '{}' (expected one of {:?})",
                        protocol,
                        Self::PROTOCOLS
                    ),
                });
            }
            if endpoint.trim().is_empty() {
                return Err(PacfetchError::Config {
                    message: format!("Empty proxy endpoint for protocol '{}'", protocol),
                });
            }
        }
        Ok(())
    }
}

/// Per-run configuration of a download session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub pacman: PackageManagerConfig,
    /// Secondary caches, consulted in order and populated best-effort.
    pub aux_cache_dirs: Vec<PathBuf>,
    pub proxies: ProxyConfig,
    /// Precomputed mirror ranking, best first.
    pub mirror_ranking: Vec<String>,
    pub mirror_backoff_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            pacman: PackageManagerConfig::default(),
            aux_cache_dirs: Vec::new(),
            proxies: ProxyConfig::default(),
            mirror_ranking: Vec::new(),
            mirror_backoff_ms: NetworkConfig::MIRROR_BACKOFF.as_millis() as u64,
            fetch_timeout_secs: NetworkConfig::FETCH_TIMEOUT.as_secs(),
        }
    }
}

impl DownloadConfig {
    /// Create a configuration for the given primary cache directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            pacman: PackageManagerConfig {
                cache_dir: cache_dir.into(),
                ..PackageManagerConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PacfetchError::io_with_path(e, path))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_aux_cache_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.aux_cache_dirs = dirs;
        self
    }

    pub fn with_proxies(mut self, proxies: ProxyConfig) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_mirror_ranking(mut self, ranking: Vec<String>) -> Self {
        self.mirror_ranking = ranking;
        self
    }

    pub fn with_mirror_backoff(mut self, backoff: Duration) -> Self {
        self.mirror_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn mirror_backoff(&self) -> Duration {
        Duration::from_millis(self.mirror_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.pacman.cache_dir
    }

    pub fn validate(&self) -> Result<()> {
        if self.pacman.cache_dir.as_os_str().is_empty() {
            return Err(PacfetchError::Config {
                message: "Primary cache directory is not set".to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(PacfetchError::Config {
                message: "Fetch timeout must be at least one second".to_string(),
            });
        }
        self.proxies.validate()
    }
}
