//! Metalink XML documents (RFC 5854) as produced by package manager
//! download queue exporters.
//!
//! Each `<file>` element describes one package:
//!
//! ```xml
//! <metalink xmlns="urn:ietf:params:xml:ns:metalink">
//!  <file name="bash-5.2-1-x86_64.pkg.tar.zst">
//!   <identity>bash</identity>
//!   <size>1843200</size>
//!   <version>5.2-1</version>
//!   <description>The GNU Bourne Again shell</description>
//!   <hash type="sha256">...</hash>
//!   <hash type="md5">...</hash>
//!   <url>https://mirror.example/core/os/x86_64/bash-5.2-1-x86_64.pkg.tar.zst</url>
//!  </file>
//! </metalink>
//! ```
//!
//! Files without an `<identity>` (signatures, sync databases) are skipped.

use crate::config::{MetalinkConfig, PackageManagerConfig};
use crate::error::{PacfetchError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::resolver::MetalinkResolver;
use super::types::{Metalink, PackageRequest};

/// Parsed metalink document, indexed by package identity.
#[derive(Debug, Clone, Default)]
pub struct MetalinkDocument {
    files: Vec<Metalink>,
    by_identity: HashMap<String, usize>,
}

impl MetalinkDocument {
    /// Parse a metalink document from its XML text.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| PacfetchError::Metalink {
            message: e.to_string(),
        })?;

        let root = doc.root_element();
        if root.tag_name().name() != "metalink" {
            return Err(PacfetchError::Metalink {
                message: format!("unexpected root element <{}>", root.tag_name().name()),
            });
        }
        if let Some(ns) = root.tag_name().namespace() {
            if ns != MetalinkConfig::NAMESPACE {
                debug!("Metalink document uses namespace {}", ns);
            }
        }

        let mut document = Self::default();
        for file in root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "file")
        {
            match parse_file(file)? {
                Some(metalink) => document.insert(metalink),
                None => debug!(
                    "Skipping metalink file entry {:?} without identity",
                    file.attribute("name")
                ),
            }
        }

        Ok(document)
    }

    /// Read and parse a metalink document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml =
            std::fs::read_to_string(path).map_err(|e| PacfetchError::io_with_path(e, path))?;
        Self::parse(&xml)
    }

    /// Add a metalink. The first entry for an identity wins.
    pub fn insert(&mut self, metalink: Metalink) {
        if self.by_identity.contains_key(&metalink.identity) {
            debug!("Ignoring duplicate metalink entry for {}", metalink.identity);
            return;
        }
        self.by_identity
            .insert(metalink.identity.clone(), self.files.len());
        self.files.push(metalink);
    }

    pub fn get(&self, identity: &str) -> Option<&Metalink> {
        self.by_identity.get(identity).map(|&i| &self.files[i])
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metalink> {
        self.files.iter()
    }
}

fn parse_file(file: roxmltree::Node<'_, '_>) -> Result<Option<Metalink>> {
    let filename = file
        .attribute("name")
        .ok_or_else(|| PacfetchError::Metalink {
            message: "<file> element without a name attribute".to_string(),
        })?;

    let mut identity = None;
    let mut version = String::new();
    let mut metalink = Metalink::new("", "", filename);
    let mut urls = Vec::new();

    for child in file.children().filter(|n| n.is_element()) {
        let text = child.text().map(str::trim).unwrap_or_default();
        match child.tag_name().name() {
            "identity" => identity = Some(text.to_string()),
            "version" => version = text.to_string(),
            "description" => metalink.description = Some(text.to_string()),
            "size" => match text.parse::<u64>() {
                Ok(size) => metalink.expected_size = Some(size),
                Err(_) => warn!("Invalid size '{}' for {} in metalink", text, filename),
            },
            "hash" => match child.attribute("type") {
                Some("sha256") => metalink = metalink.with_sha256(text),
                Some("md5") => metalink = metalink.with_md5(text),
                other => debug!("Ignoring {:?} hash for {}", other, filename),
            },
            "url" => urls.push(text.to_string()),
            _ => {}
        }
    }

    let Some(identity) = identity else {
        return Ok(None);
    };
    if urls.len() > MetalinkConfig::MAX_URLS {
        debug!(
            "Keeping {} of {} urls for {}",
            MetalinkConfig::MAX_URLS,
            urls.len(),
            identity
        );
    }
    metalink.identity = identity;
    metalink.version = version;
    Ok(Some(metalink.with_urls(urls)))
}

/// Strip an exact-match operator from a version constraint.
///
/// Ordering operators need the package manager's version comparison and are
/// left to the metadata backend; `None` means "no exact version required".
fn exact_version(constraint: &str) -> Option<&str> {
    let constraint = constraint.trim();
    if constraint.starts_with(['<', '>']) {
        return None;
    }
    Some(constraint.trim_start_matches('=').trim())
}

#[async_trait]
impl MetalinkResolver for MetalinkDocument {
    async fn resolve(
        &self,
        request: &PackageRequest,
        _config: &PackageManagerConfig,
    ) -> Result<Metalink> {
        let metalink = self
            .get(&request.identity)
            .ok_or_else(|| PacfetchError::Metadata {
                identity: request.identity.clone(),
                message: "package not found in metalink document".to_string(),
            })?;

        if let Some(wanted) = request.version.as_deref().and_then(exact_version) {
            if !wanted.is_empty() && wanted != metalink.version {
                return Err(PacfetchError::Metadata {
                    identity: request.identity.clone(),
                    message: format!(
                        "version {} requested but metalink provides {}",
                        wanted, metalink.version
                    ),
                });
            }
        }

        Ok(metalink.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" ?>
<metalink xmlns="urn:ietf:params:xml:ns:metalink">
 <file name="core.db">
  <url>https://mirror.example/core/os/x86_64/core.db</url>
 </file>
 <file name="bash-5.2-1-x86_64.pkg.tar.zst">
  <identity>bash</identity>
  <size>1843200</size>
  <version>5.2-1</version>
  <description>The GNU Bourne Again shell</description>
  <hash type="sha256">AABBCC</hash>
  <hash type="md5">ddeeff</hash>
  <url>https://a.example/bash-5.2-1-x86_64.pkg.tar.zst</url>
  <url>https://b.example/bash-5.2-1-x86_64.pkg.tar.zst</url>
 </file>
 <file name="bash-5.2-1-x86_64.pkg.tar.zst.sig">
  <url>https://a.example/bash-5.2-1-x86_64.pkg.tar.zst.sig</url>
 </file>
</metalink>"#;

    #[test]
    fn test_parse_document() {
        let doc = MetalinkDocument::parse(DOC).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(
            doc.iter().map(|m| m.identity.as_str()).collect::<Vec<_>>(),
            vec!["bash"]
        );

        let bash = doc.get("bash").unwrap();
        assert_eq!(bash.filename, "bash-5.2-1-x86_64.pkg.tar.zst");
        assert_eq!(bash.version, "5.2-1");
        assert_eq!(bash.expected_size, Some(1_843_200));
        assert_eq!(bash.hashes.sha256.as_deref(), Some("aabbcc"));
        assert_eq!(bash.hashes.md5.as_deref(), Some("ddeeff"));
        assert_eq!(bash.urls.len(), 2);
        assert_eq!(
            bash.description.as_deref(),
            Some("The GNU Bourne Again shell")
        );
    }

    #[test]
    fn test_parse_truncates_urls() {
        let urls: String = (0..20)
            .map(|i| format!("<url>https://m{}.example/p.pkg</url>", i))
            .collect();
        let xml = format!(
            r#"<metalink xmlns="urn:ietf:params:xml:ns:metalink"><file name="p.pkg"><identity>p</identity><version>1</version>{}</file></metalink>"#,
            urls
        );
        let doc = MetalinkDocument::parse(&xml).unwrap();
        assert_eq!(doc.get("p").unwrap().urls.len(), MetalinkConfig::MAX_URLS);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MetalinkDocument::parse("not xml").is_err());
        assert!(MetalinkDocument::parse("<other/>").is_err());
        assert!(MetalinkDocument::parse(
            r#"<metalink><file><identity>x</identity></file></metalink>"#
        )
        .is_err());
    }

    #[test]
    fn test_exact_version() {
        assert_eq!(exact_version("=5.2-1"), Some("5.2-1"));
        assert_eq!(exact_version("5.2-1"), Some("5.2-1"));
        assert_eq!(exact_version(">=5.0"), None);
    }

    #[tokio::test]
    async fn test_resolve() {
        let doc = MetalinkDocument::parse(DOC).unwrap();
        let config = PackageManagerConfig::default();

        let bash = doc
            .resolve(&PackageRequest::new("bash"), &config)
            .await
            .unwrap();
        assert_eq!(bash.identity, "bash");

        assert!(doc
            .resolve(&PackageRequest::new("zsh"), &config)
            .await
            .is_err());
        assert!(doc
            .resolve(&PackageRequest::new("bash").with_version("=5.1-1"), &config)
            .await
            .is_err());
        assert!(doc
            .resolve(&PackageRequest::new("bash").with_version(">=5.0"), &config)
            .await
            .is_ok());
    }
}
