//! Pacfetch - make packages available in a local package cache.
//!
//! Packages are described by a metalink document. Each one is taken from the
//! primary cache when valid, copied from an auxiliary cache, or downloaded
//! from its mirrors.

use anyhow::{Context, Result};
use clap::Parser;
use pacfetch_core::{
    DownloadConfig, DownloadSession, LogSink, MetalinkDocument, MirrorRanking, PackageRequest,
    ProxyConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pacfetch")]
#[command(about = "Fetch packages into a local cache from ranked mirrors")]
struct Args {
    /// Metalink document describing the packages
    #[arg(long)]
    metalink: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Primary package cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Package manager configuration file
    #[arg(long)]
    pacman_conf: Option<PathBuf>,

    /// Auxiliary cache directory (repeatable, checked in order)
    #[arg(long = "aux-cache")]
    aux_caches: Vec<PathBuf>,

    /// Ranked mirrorlist file, best mirror first
    #[arg(long)]
    mirrorlist: Option<PathBuf>,

    /// Outbound proxy as PROTO=URL, PROTO being http, https or all (repeatable)
    #[arg(long = "proxy", value_parser = parse_proxy)]
    proxies: Vec<(String, String)>,

    /// Seconds to wait before trying the next mirror
    #[arg(long)]
    backoff_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Packages to fetch, optionally with a version (`bash=5.2.037-1`)
    #[arg(required = true)]
    packages: Vec<String>,
}

fn parse_proxy(value: &str) -> std::result::Result<(String, String), String> {
    let (protocol, endpoint) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PROTO=URL, got '{}'", value))?;
    if protocol.is_empty() || endpoint.is_empty() {
        return Err(format!("expected PROTO=URL, got '{}'", value));
    }
    Ok((protocol.to_string(), endpoint.to_string()))
}

fn parse_package(value: &str) -> PackageRequest {
    match value.find(['<', '>', '=']) {
        Some(index) if index > 0 => {
            PackageRequest::new(&value[..index]).with_version(&value[index..])
        }
        _ => PackageRequest::new(value),
    }
}

fn build_config(args: &Args) -> Result<DownloadConfig> {
    let mut config = match &args.config {
        Some(path) => DownloadConfig::from_json_file(path)
            .with_context(|| format!("Can't load configuration from {}", path.display()))?,
        None => DownloadConfig::default(),
    };

    if let Some(cache_dir) = &args.cache_dir {
        config.pacman.cache_dir = cache_dir.clone();
    }
    if let Some(conf_file) = &args.pacman_conf {
        config.pacman.conf_file = conf_file.clone();
    }
    if !args.aux_caches.is_empty() {
        config.aux_cache_dirs = args.aux_caches.clone();
    }
    if !args.proxies.is_empty() {
        config.proxies = ProxyConfig::from_pairs(args.proxies.iter().cloned());
    }
    if let Some(path) = &args.mirrorlist {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Can't read mirrorlist {}", path.display()))?;
        config.mirror_ranking = MirrorRanking::from_mirrorlist(&content).into_entries();
    }
    if let Some(secs) = args.backoff_secs {
        config = config.with_mirror_backoff(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = build_config(&args)?;
    debug!("Configuration: {:?}", config);
    info!("Primary cache: {}", config.cache_dir().display());

    let document = MetalinkDocument::from_path(&args.metalink)
        .with_context(|| format!("Can't read metalink {}", args.metalink.display()))?;
    info!("Metalink describes {} packages", document.len());
    for metalink in document.iter() {
        debug!(
            "{} {}: {} ({} mirrors)",
            metalink.identity,
            metalink.version,
            metalink.filename,
            metalink.urls.len()
        );
    }

    let requests: Vec<PackageRequest> = args.packages.iter().map(|p| parse_package(p)).collect();
    let session = DownloadSession::new(config, Arc::new(document), Arc::new(LogSink))?;
    let summary = session.start(&requests, None).await?;

    info!(
        "{} packages ready: {} already cached, {} copied from auxiliary caches, {} downloaded ({} failed mirror attempts, {} cache copies)",
        summary.total,
        summary.primary_hits,
        summary.aux_hits,
        summary.downloads,
        summary.failed_attempts,
        summary.replicated
    );

    Ok(())
}
