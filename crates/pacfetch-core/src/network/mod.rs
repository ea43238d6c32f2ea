//! Network module for mirror downloads.
//!
//! This module provides:
//! - HTTP client with timeouts and proxy support
//! - A fetch seam with the streaming mirror implementation

mod client;
mod fetcher;

pub use client::HttpClient;
pub use fetcher::{DynFetcher, Fetch, MirrorFetcher};
