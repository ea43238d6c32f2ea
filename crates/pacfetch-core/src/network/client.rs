//! HTTP client for mirror downloads.
//!
//! Provides a wrapper around reqwest with:
//! - Connect and read timeouts short enough to notice a dead mirror quickly
//! - Optional outbound proxies
//! - User-agent management

use crate::config::{DownloadConfig, NetworkConfig, ProxyConfig};
use crate::{PacfetchError, Result};
use reqwest::{Client, Proxy, Response};
use std::time::Duration;
use tracing::debug;

/// HTTP client used by the mirror fetcher.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default timeout and no proxy.
    pub fn new() -> Result<Self> {
        Self::with_settings(NetworkConfig::FETCH_TIMEOUT, &ProxyConfig::default())
    }

    /// Create a client from a download configuration.
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        Self::with_settings(config.fetch_timeout(), &config.proxies)
    }

    /// Create a client with a custom timeout and proxy settings.
    ///
    /// The timeout bounds connection setup and every read of the body, not
    /// the whole transfer, so large packages on slow links still complete.
    pub fn with_settings(timeout: Duration, proxies: &ProxyConfig) -> Result<Self> {
        proxies.validate()?;

        let mut builder = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT);

        if proxies.is_disabled() {
            builder = builder.no_proxy();
        } else {
            debug!("Will use these proxy settings: {:?}", proxies);
            for (protocol, endpoint) in proxies.iter() {
                let proxy = match protocol {
                    "http" => Proxy::http(endpoint),
                    "https" => Proxy::https(endpoint),
                    _ => Proxy::all(endpoint),
                }
                .map_err(|e| PacfetchError::Config {
                    message: format!("Invalid {} proxy '{}': {}", protocol, endpoint, e),
                })?;
                builder = builder.proxy(proxy);
            }
        }

        let client = builder.build().map_err(|e| PacfetchError::Network {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(e),
        })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a streaming GET request.
    ///
    /// Non-success statuses are returned as responses; the caller decides.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                PacfetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                PacfetchError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })
    }
}
