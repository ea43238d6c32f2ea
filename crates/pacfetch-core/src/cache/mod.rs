//! Local package caches.
//!
//! This module provides:
//! - Lookup across the primary and auxiliary caches
//! - Background replication of downloads into auxiliary caches
//! - Cache directory creation

mod dirs;
mod locator;
mod replicator;

pub use dirs::{ensure_cache_dir, ensure_cache_dir_async, is_same_dir};
pub use locator::{CacheLocator, CacheLookup};
pub use replicator::CacheReplicator;
