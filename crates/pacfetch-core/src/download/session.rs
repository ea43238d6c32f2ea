//! Download session: metalink construction followed by a download pass.

use crate::cache::ensure_cache_dir;
use crate::config::DownloadConfig;
use crate::events::{DynEventSink, EventEmitter};
use crate::metalink::{DynResolver, MirrorRanking, PackageRequest};
use crate::network::{DynFetcher, MirrorFetcher};
use crate::{PacfetchError, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::orchestrator::{DownloadSummary, PackageDownloader};
use super::work_set::DownloadWorkSet;

/// Makes a list of packages available in the primary cache.
pub struct DownloadSession {
    config: DownloadConfig,
    resolver: DynResolver,
    fetcher: DynFetcher,
    ranking: MirrorRanking,
    events: Arc<EventEmitter>,
}

impl DownloadSession {
    /// Create a session, creating the primary cache directory if needed.
    pub fn new(config: DownloadConfig, resolver: DynResolver, sink: DynEventSink) -> Result<Self> {
        config.validate()?;
        ensure_cache_dir(config.cache_dir())?;

        let fetcher: DynFetcher = Arc::new(MirrorFetcher::new(&config)?);
        let ranking = MirrorRanking::new(config.mirror_ranking.clone());

        Ok(Self {
            config,
            resolver,
            fetcher,
            ranking,
            events: Arc::new(EventEmitter::new(sink)),
        })
    }

    /// Replace the network fetcher.
    pub fn with_fetcher(mut self, fetcher: DynFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Resolve every request into a metalink, ordering urls by the ranking.
    ///
    /// Fails on the first package that can't be resolved. Repeated
    /// identities are resolved once.
    pub async fn build_metalinks(&self, requests: &[PackageRequest]) -> Result<DownloadWorkSet> {
        self.events.percent(0.0);
        self.events
            .info("Creating the list of packages to download...");

        let total = requests.len();
        let mut work_set = DownloadWorkSet::new();

        for (processed, request) in requests.iter().enumerate() {
            if work_set.contains(&request.identity) {
                debug!("{} is already in the download list", request.identity);
            } else {
                let mut metalink = self
                    .resolver
                    .resolve(request, &self.config.pacman)
                    .await
                    .map_err(|e| {
                        error!(
                            "Error creating metalink for package {}. Installation will stop",
                            request.identity
                        );
                        e
                    })?;
                self.ranking.apply(&mut metalink);
                work_set.insert(metalink);
            }

            let percent = ((processed + 1) as f64 / total as f64 * 100.0).round() / 100.0;
            self.events.percent(percent);
        }

        self.events.info("");
        Ok(work_set)
    }

    /// Run a full session.
    ///
    /// `metalinks` skips construction when the caller already has them. The
    /// work set is consumed; use [`Self::download`] to keep what is left
    /// after a failure.
    pub async fn start(
        &self,
        requests: &[PackageRequest],
        metalinks: Option<DownloadWorkSet>,
    ) -> Result<DownloadSummary> {
        let mut work_set = match metalinks {
            Some(work_set) => work_set,
            None => self.build_metalinks(requests).await.map_err(|e| {
                PacfetchError::install("Can't create download package list.", e)
            })?,
        };

        self.download(&mut work_set).await
    }

    /// Run the download pass over `work_set`.
    ///
    /// On failure `work_set` holds the package that stopped the pass and
    /// every package not reached yet, ready to be passed back in.
    pub async fn download(&self, work_set: &mut DownloadWorkSet) -> Result<DownloadSummary> {
        info!("Downloading {} packages", work_set.len());

        let mut downloader =
            PackageDownloader::new(&self.config, self.fetcher.clone(), self.events.clone());
        downloader.run(work_set).await.map_err(|e| {
            error!(
                "Packages left to download: {}",
                work_set.identities().join(", ")
            );
            PacfetchError::install(
                "Can't download needed packages. Installation can't continue.",
                e,
            )
        })
    }
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("config", &self.config)
            .field("ranking", &self.ranking)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageManagerConfig;
    use crate::events::{EventCategory, NullSink};
    use crate::metalink::{Metalink, MetalinkResolver, StaticResolver};
    use crate::network::Fetch;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingResolver {
        inner: StaticResolver,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetalinkResolver for CountingResolver {
        async fn resolve(
            &self,
            request: &PackageRequest,
            config: &PackageManagerConfig,
        ) -> Result<Metalink> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(request, config).await
        }
    }

    struct NoNetwork;

    #[async_trait]
    impl Fetch for NoNetwork {
        async fn fetch(
            &self,
            url: &str,
            _destination: &Path,
            _metalink: Option<&Metalink>,
            _events: &EventEmitter,
        ) -> Result<u64> {
            Err(PacfetchError::DownloadFailed {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    struct Online;

    #[async_trait]
    impl Fetch for Online {
        async fn fetch(
            &self,
            _url: &str,
            destination: &Path,
            _metalink: Option<&Metalink>,
            _events: &EventEmitter,
        ) -> Result<u64> {
            std::fs::write(destination, b"pkg")?;
            Ok(3)
        }
    }

    fn known() -> Vec<Metalink> {
        vec![
            Metalink::new("bash", "5.2-1", "bash-5.2-1.pkg.tar.zst").with_urls([
                "http://slow.example.org/bash",
                "http://fast.example.org/bash",
            ]),
            Metalink::new("zsh", "5.9-1", "zsh-5.9-1.pkg.tar.zst")
                .with_urls(["http://fast.example.org/zsh"]),
        ]
    }

    fn session(temp: &TempDir, resolver: DynResolver) -> DownloadSession {
        let config = DownloadConfig::new(temp.path().join("cache/pkg"))
            .with_mirror_ranking(vec![
                "Server = http://fast.example.org/$repo/os/$arch".to_string(),
                "Server = http://slow.example.org/$repo/os/$arch".to_string(),
            ])
            .with_mirror_backoff(Duration::ZERO);
        DownloadSession::new(config, resolver, Arc::new(NullSink))
            .unwrap()
            .with_fetcher(Arc::new(NoNetwork))
    }

    #[tokio::test]
    async fn test_new_creates_cache_dir() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp, Arc::new(StaticResolver::default()));
        assert!(session.config().cache_dir().is_dir());
    }

    #[tokio::test]
    async fn test_build_metalinks_ranks_and_dedups() {
        let temp = TempDir::new().unwrap();
        let resolver = Arc::new(CountingResolver {
            inner: StaticResolver::new(known()),
            calls: AtomicUsize::new(0),
        });
        let session = session(&temp, resolver.clone());

        let requests = [
            PackageRequest::new("bash"),
            PackageRequest::new("zsh"),
            PackageRequest::new("bash"),
        ];
        let work_set = session.build_metalinks(&requests).await.unwrap();

        assert_eq!(work_set.len(), 2);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            work_set.get("bash").unwrap().urls,
            vec!["http://fast.example.org/bash", "http://slow.example.org/bash"]
        );
        assert_eq!(session.events().last(EventCategory::Info).as_deref(), Some(""));
        assert_eq!(
            session.events().last(EventCategory::Percent).as_deref(),
            Some("1.00")
        );
    }

    #[tokio::test]
    async fn test_unknown_package_fails_construction() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp, Arc::new(StaticResolver::new(known())));

        let err = session
            .start(&[PackageRequest::new("bash"), PackageRequest::new("nope")], None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Can't create download package list.");
        match err {
            PacfetchError::Install { source, .. } => {
                assert!(matches!(
                    source.as_deref(),
                    Some(PacfetchError::Metadata { identity, .. }) if identity == "nope"
                ));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_failure_is_wrapped() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp, Arc::new(StaticResolver::new(known())));

        let err = session
            .start(&[PackageRequest::new("zsh")], None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't download needed packages. Installation can't continue."
        );
    }

    #[tokio::test]
    async fn test_download_failure_keeps_remainder() {
        let temp = TempDir::new().unwrap();
        let session = session(&temp, Arc::new(StaticResolver::new(known())));

        let mut work_set = session
            .build_metalinks(&[PackageRequest::new("bash"), PackageRequest::new("zsh")])
            .await
            .unwrap();
        let err = session.download(&mut work_set).await.unwrap_err();

        assert!(matches!(err, PacfetchError::Install { .. }));
        // The first package tried is put back and the other is untouched
        assert_eq!(work_set.identities(), vec!["bash", "zsh"]);
        assert_eq!(
            work_set.get("bash").unwrap().urls,
            vec!["http://fast.example.org/bash", "http://slow.example.org/bash"]
        );

        // What is left can be handed back once the network is back
        let summary = session
            .with_fetcher(Arc::new(Online))
            .start(&[], Some(work_set))
            .await
            .unwrap();
        assert_eq!(summary.downloads, 2);
        assert!(temp.path().join("cache/pkg/zsh-5.9-1.pkg.tar.zst").is_file());
    }

    #[tokio::test]
    async fn test_prebuilt_metalinks_skip_resolution() {
        let temp = TempDir::new().unwrap();
        let resolver = Arc::new(CountingResolver {
            inner: StaticResolver::default(),
            calls: AtomicUsize::new(0),
        });
        let session = session(&temp, resolver.clone());

        let summary = session
            .start(&[], Some(DownloadWorkSet::new()))
            .await
            .unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }
}
