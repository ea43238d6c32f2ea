//! Download passes.
//!
//! This module provides:
//! - The work set of packages still to fetch
//! - The sequential orchestrator with mirror fallback and back-off
//! - The session tying metalink construction to a pass

mod orchestrator;
mod session;
mod work_set;

pub use orchestrator::{DownloadSummary, PackageDownloader};
pub use session::DownloadSession;
pub use work_set::DownloadWorkSet;
