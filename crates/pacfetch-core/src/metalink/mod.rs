//! Package metalinks: what to download, from where, and how to verify it.
//!
//! This module provides:
//! - Request and metalink types
//! - The resolver seam to the package manager metadata backend
//! - Metalink XML document parsing
//! - Mirror ordering against a precomputed ranking

mod document;
mod ranking;
mod resolver;
mod types;

pub use document::MetalinkDocument;
pub use ranking::MirrorRanking;
pub use resolver::{DynResolver, MetalinkResolver, StaticResolver};
pub use types::{FileHashes, Metalink, PackageRequest};
