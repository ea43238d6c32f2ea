//! Pacfetch Core - Package download and cache reconciliation engine.
//!
//! Makes a list of packages available in a local package cache before an
//! installation proceeds. Packages are taken from the primary cache, copied
//! from auxiliary caches, or downloaded from a ranked list of mirrors and
//! verified against their metalink.
//!
//! # Example
//!
//! ```rust,ignore
//! use pacfetch_core::{DownloadConfig, DownloadSession, LogSink, MetalinkDocument, PackageRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pacfetch_core::Result<()> {
//!     let resolver = Arc::new(MetalinkDocument::from_path("/tmp/packages.meta4")?);
//!     let config = DownloadConfig::new("/install/var/cache/pacman/pkg");
//!     let session = DownloadSession::new(config, resolver, Arc::new(LogSink))?;
//!
//!     let summary = session.start(&[PackageRequest::new("base")], None).await?;
//!     println!("{} packages downloaded", summary.downloads);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod integrity;
pub mod metalink;
pub mod network;

// Re-export commonly used types
pub use cache::{CacheLocator, CacheLookup, CacheReplicator};
pub use config::{DownloadConfig, PackageManagerConfig, ProxyConfig};
pub use download::{DownloadSession, DownloadSummary, DownloadWorkSet, PackageDownloader};
pub use error::{PacfetchError, Result};
pub use events::{
    ChannelSink, DynEventSink, EventCategory, EventEmitter, EventSink, EventValue, LogSink,
    NullSink, ProgressEvent,
};
pub use integrity::Verification;
pub use metalink::{
    DynResolver, Metalink, MetalinkDocument, MetalinkResolver, MirrorRanking, PackageRequest,
    StaticResolver,
};
pub use network::{DynFetcher, Fetch, HttpClient, MirrorFetcher};
