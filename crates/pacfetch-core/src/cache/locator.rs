//! Cache tier lookup: primary cache first, then auxiliary caches.

use crate::events::{EventCategory, EventEmitter};
use crate::integrity::{self, Verification};
use crate::metalink::Metalink;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::dirs::is_same_dir;

/// Where a package was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Already present and valid in the primary cache.
    PrimaryHit,
    /// Copied into the primary cache from this auxiliary directory.
    AuxiliaryHit(PathBuf),
    /// Not available locally; needs a network fetch.
    Miss,
}

impl CacheLookup {
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, CacheLookup::Miss)
    }
}

/// Finds packages in the primary cache or in auxiliary caches.
#[derive(Debug, Clone)]
pub struct CacheLocator {
    primary_dir: PathBuf,
    aux_dirs: Vec<PathBuf>,
}

impl CacheLocator {
    pub fn new(primary_dir: impl Into<PathBuf>, aux_dirs: Vec<PathBuf>) -> Self {
        Self {
            primary_dir: primary_dir.into(),
            aux_dirs,
        }
    }

    pub fn primary_dir(&self) -> &Path {
        &self.primary_dir
    }

    /// Final location of a package in the primary cache.
    pub fn primary_path(&self, metalink: &Metalink) -> PathBuf {
        self.primary_dir.join(&metalink.filename)
    }

    /// Look for a valid copy of the package, copying it into the primary
    /// cache when it is found in an auxiliary cache.
    ///
    /// Never fails: unreadable files, checksum mismatches and copy errors
    /// all fall through to the next tier and finally to [`CacheLookup::Miss`].
    pub async fn locate(&self, metalink: &Metalink, events: &EventEmitter) -> CacheLookup {
        let dst_path = self.primary_path(metalink);

        if dst_path.exists() {
            let verification = integrity::verify_async(dst_path.clone(), metalink.clone()).await;
            if verification.is_acceptable() {
                report_unverifiable(&verification, metalink, events);
                debug!(
                    "File {} found in {} cache, there is no need to download it",
                    metalink.filename,
                    self.primary_dir.display()
                );
                return CacheLookup::PrimaryHit;
            }
            // Wrong checksum: the stale file gets replaced by whatever tier
            // succeeds below
            debug!(
                "Cached {} is not usable ({:?}), looking elsewhere",
                dst_path.display(),
                verification
            );
        }

        for aux_dir in &self.aux_dirs {
            if is_same_dir(aux_dir, &self.primary_dir) {
                continue;
            }

            let candidate = aux_dir.join(&metalink.filename);
            if !candidate.exists() {
                continue;
            }

            let verification = integrity::verify_async(candidate.clone(), metalink.clone()).await;
            if !verification.is_acceptable() {
                debug!(
                    "Skipping {} from {} ({:?})",
                    metalink.filename,
                    aux_dir.display(),
                    verification
                );
                continue;
            }

            match tokio::fs::copy(&candidate, &dst_path).await {
                Ok(_) => {
                    report_unverifiable(&verification, metalink, events);
                    debug!(
                        "{} found in {} cache, there is no need to download it",
                        metalink.filename,
                        aux_dir.display()
                    );
                    return CacheLookup::AuxiliaryHit(aux_dir.clone());
                }
                Err(e) => {
                    debug!(
                        "Error copying {} to {}: {}",
                        candidate.display(),
                        dst_path.display(),
                        e
                    );
                    let _ = tokio::fs::remove_file(&dst_path).await;
                }
            }
        }

        CacheLookup::Miss
    }
}

fn report_unverifiable(verification: &Verification, metalink: &Metalink, events: &EventEmitter) {
    if *verification == Verification::Unverifiable {
        events.add(
            EventCategory::CachePkgsMd5CheckFailed,
            metalink.identity.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        primary: PathBuf,
        aux_a: PathBuf,
        aux_b: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = TempDir::new().unwrap();
        let primary = root.path().join("pkg");
        let aux_a = root.path().join("aux-a");
        let aux_b = root.path().join("aux-b");
        for dir in [&primary, &aux_a, &aux_b] {
            std::fs::create_dir_all(dir).unwrap();
        }
        Dirs {
            _root: root,
            primary,
            aux_a,
            aux_b,
        }
    }

    fn metalink() -> Metalink {
        let digest = integrity_digest(b"package bytes");
        Metalink::new("pkg", "1-1", "pkg-1-1.pkg.tar.zst")
            .with_size(13)
            .with_sha256(digest)
    }

    fn integrity_digest(content: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(content))
    }

    #[tokio::test]
    async fn test_primary_hit() {
        let d = dirs();
        let metalink = metalink();
        std::fs::write(d.primary.join(&metalink.filename), b"package bytes").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone()]);
        assert_eq!(
            locator.locate(&metalink, &EventEmitter::null()).await,
            CacheLookup::PrimaryHit
        );
    }

    #[tokio::test]
    async fn test_miss_when_nothing_cached() {
        let d = dirs();
        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone(), d.aux_b.clone()]);
        let lookup = locator.locate(&metalink(), &EventEmitter::null()).await;
        assert_eq!(lookup, CacheLookup::Miss);
        assert!(!lookup.is_satisfied());
    }

    #[tokio::test]
    async fn test_auxiliary_hit_copies_into_primary() {
        let d = dirs();
        let metalink = metalink();
        std::fs::write(d.aux_b.join(&metalink.filename), b"package bytes").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone(), d.aux_b.clone()]);
        let lookup = locator.locate(&metalink, &EventEmitter::null()).await;

        assert_eq!(lookup, CacheLookup::AuxiliaryHit(d.aux_b.clone()));
        assert_eq!(
            std::fs::read(d.primary.join(&metalink.filename)).unwrap(),
            b"package bytes"
        );
    }

    #[tokio::test]
    async fn test_corrupt_auxiliary_copy_is_skipped() {
        let d = dirs();
        let metalink = metalink();
        std::fs::write(d.aux_a.join(&metalink.filename), b"package bytez").unwrap();
        std::fs::write(d.aux_b.join(&metalink.filename), b"package bytes").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone(), d.aux_b.clone()]);
        assert_eq!(
            locator.locate(&metalink, &EventEmitter::null()).await,
            CacheLookup::AuxiliaryHit(d.aux_b.clone())
        );
    }

    #[tokio::test]
    async fn test_stale_primary_replaced_from_auxiliary() {
        let d = dirs();
        let metalink = metalink();
        std::fs::write(d.primary.join(&metalink.filename), b"stale bytes!!").unwrap();
        std::fs::write(d.aux_a.join(&metalink.filename), b"package bytes").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone()]);
        assert_eq!(
            locator.locate(&metalink, &EventEmitter::null()).await,
            CacheLookup::AuxiliaryHit(d.aux_a.clone())
        );
        assert_eq!(
            std::fs::read(d.primary.join(&metalink.filename)).unwrap(),
            b"package bytes"
        );
    }

    #[tokio::test]
    async fn test_md5_only_corrupt_copies_are_skipped() {
        let d = dirs();
        // MD5 of "package bytes"
        let metalink = Metalink::new("pkg", "1-1", "pkg-1-1.pkg.tar.zst")
            .with_md5("92b5ee36dd2ec180e12bf3344f9cf676");
        std::fs::write(d.primary.join(&metalink.filename), b"package bytez").unwrap();
        std::fs::write(d.aux_a.join(&metalink.filename), b"package bytez").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.aux_a.clone()]);
        assert_eq!(
            locator.locate(&metalink, &EventEmitter::null()).await,
            CacheLookup::Miss
        );
    }

    #[tokio::test]
    async fn test_primary_listed_as_auxiliary_is_ignored() {
        let d = dirs();
        let metalink = metalink();
        std::fs::write(d.primary.join(&metalink.filename), b"stale bytes!!").unwrap();

        let locator = CacheLocator::new(&d.primary, vec![d.primary.clone()]);
        assert_eq!(
            locator.locate(&metalink, &EventEmitter::null()).await,
            CacheLookup::Miss
        );
        // The stale file was not truncated by a copy onto itself
        assert_eq!(
            std::fs::read(d.primary.join(&metalink.filename)).unwrap(),
            b"stale bytes!!"
        );
    }
}
