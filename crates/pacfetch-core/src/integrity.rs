//! Package file verification against a metalink.
//!
//! Verification never fails with an error: unreadable files are reported as
//! [`Verification::Unreadable`] so a cache tier can simply be skipped and the
//! package fetched again.

use crate::config::PathsConfig;
use crate::metalink::Metalink;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What was compared when a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    Size,
    Sha256,
    Md5,
}

impl std::fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchKind::Size => write!(f, "size"),
            MismatchKind::Sha256 => write!(f, "SHA256"),
            MismatchKind::Md5 => write!(f, "MD5"),
        }
    }
}

/// Outcome of checking a file against a metalink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Size and checksum match.
    Valid,
    /// The metalink has no checksum at all; the file is accepted as is.
    Unverifiable,
    Mismatch {
        kind: MismatchKind,
        expected: String,
        actual: String,
    },
    /// The file is missing or could not be read.
    Unreadable(String),
}

impl Verification {
    /// Whether the file can be used as the package.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Verification::Valid | Verification::Unverifiable)
    }
}

/// Compute the SHA256 digest of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    digest_file::<Sha256>(path)
}

/// Compute the MD5 digest of a file as lowercase hex.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    digest_file::<Md5>(path)
}

fn digest_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; PathsConfig::HASH_CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check a file against the size and checksum of a metalink.
///
/// Blocking; use [`verify_async`] from async code.
pub fn verify(path: &Path, metalink: &Metalink) -> Verification {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Verification::Unreadable(format!("{} is not a file", path.display())),
        Err(e) => return Verification::Unreadable(e.to_string()),
    };

    if let Some(expected) = metalink.expected_size {
        if metadata.len() != expected {
            warn!(
                "Size of file {} does not match ({} != {})",
                metalink.filename,
                metadata.len(),
                expected
            );
            return Verification::Mismatch {
                kind: MismatchKind::Size,
                expected: expected.to_string(),
                actual: metadata.len().to_string(),
            };
        }
    }

    // SHA256 when present, MD5 otherwise
    let (kind, expected, digest): (_, _, fn(&Path) -> std::io::Result<String>) =
        match (&metalink.hashes.sha256, &metalink.hashes.md5) {
            (Some(sha256), _) => (MismatchKind::Sha256, sha256, sha256_file),
            (None, Some(md5)) => (MismatchKind::Md5, md5, md5_file),
            (None, None) => {
                warn!(
                    "Package {} ({}) has no checksum in its metalink",
                    metalink.identity, metalink.filename
                );
                return Verification::Unverifiable;
            }
        };

    let actual = match digest(path) {
        Ok(digest) => digest,
        Err(e) => {
            debug!("Can't hash {}: {}", path.display(), e);
            return Verification::Unreadable(e.to_string());
        }
    };

    if actual.eq_ignore_ascii_case(expected) {
        debug!("{} hash of {} is OK", kind, path.display());
        Verification::Valid
    } else {
        warn!("{} hash of file {} does not match!", kind, metalink.filename);
        Verification::Mismatch {
            kind,
            expected: expected.to_lowercase(),
            actual,
        }
    }
}

/// [`verify`] on the blocking thread pool.
pub async fn verify_async(path: PathBuf, metalink: Metalink) -> Verification {
    tokio::task::spawn_blocking(move || verify(&path, &metalink))
        .await
        .unwrap_or_else(|e| Verification::Unreadable(format!("verification task failed: {}", e)))
}
