//! Mirror priority ordering against a precomputed ranking.

use crate::config::MetalinkConfig;
use url::{Position, Url};

use super::types::Metalink;

/// Ranked mirror list, best first.
///
/// Entries are free-form (mirrorlist lines, base urls); a url matches an
/// entry when the entry contains the url's `scheme://host[:port]` prefix.
/// An empty ranking leaves url order untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorRanking {
    entries: Vec<String>,
}

impl MirrorRanking {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Parse a pacman style mirrorlist: one mirror per line, comments and
    /// blank lines skipped, `Server =` prefixes stripped.
    pub fn from_mirrorlist(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| match line.split_once('=') {
                Some((key, value)) if key.trim().eq_ignore_ascii_case("server") => {
                    value.trim().to_string()
                }
                _ => line.to_string(),
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    /// Priority of a url, lower is better.
    pub fn priority(&self, url: &str) -> usize {
        if url.is_empty() {
            return MetalinkConfig::UNRANKED_PRIORITY;
        }
        let prefix = mirror_prefix(url);
        self.entries
            .iter()
            .position(|entry| entry.contains(prefix.as_str()))
            .unwrap_or(MetalinkConfig::UNRANKED_PRIORITY)
    }

    /// Stable sort of urls by priority.
    pub fn sort_urls(&self, urls: &mut [String]) {
        if self.is_empty() {
            return;
        }
        urls.sort_by_cached_key(|url| self.priority(url));
    }

    pub fn apply(&self, metalink: &mut Metalink) {
        self.sort_urls(&mut metalink.urls);
    }
}

/// The `scheme://authority` part of a url.
fn mirror_prefix(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => parsed[..Position::BeforePath].to_string(),
        _ => url.split('/').take(3).collect::<Vec<_>>().join("/"),
    }
}
