//! Metalink resolver seam.
//!
//! The package manager metadata backend lives outside this crate; it is
//! reached through [`MetalinkResolver`].

use crate::config::PackageManagerConfig;
use crate::error::{PacfetchError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Metalink, PackageRequest};

/// Maps a package request to the metalink describing how to fetch it.
///
/// A failure for any package aborts the whole metalink construction, so
/// implementations should only fail when the package really can't be
/// resolved.
#[async_trait]
pub trait MetalinkResolver: Send + Sync {
    async fn resolve(
        &self,
        request: &PackageRequest,
        config: &PackageManagerConfig,
    ) -> Result<Metalink>;
}

/// Shared resolver handle.
pub type DynResolver = Arc<dyn MetalinkResolver>;

/// Resolver backed by an in-memory set of already resolved metalinks.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    metalinks: HashMap<String, Metalink>,
}

impl StaticResolver {
    pub fn new<I>(metalinks: I) -> Self
    where
        I: IntoIterator<Item = Metalink>,
    {
        Self {
            metalinks: metalinks
                .into_iter()
                .map(|m| (m.identity.clone(), m))
                .collect(),
        }
    }
}

#[async_trait]
impl MetalinkResolver for StaticResolver {
    async fn resolve(
        &self,
        request: &PackageRequest,
        _config: &PackageManagerConfig,
    ) -> Result<Metalink> {
        self.metalinks
            .get(&request.identity)
            .cloned()
            .ok_or_else(|| PacfetchError::Metadata {
                identity: request.identity.clone(),
                message: "unknown package".to_string(),
            })
    }
}
