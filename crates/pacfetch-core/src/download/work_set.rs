//! The set of packages still to be made available in one download pass.

use crate::metalink::Metalink;
use std::collections::HashMap;

/// Packages not yet satisfied, keyed by identity.
///
/// Entries leave the set in unspecified order, each exactly once.
#[derive(Debug, Clone, Default)]
pub struct DownloadWorkSet {
    entries: HashMap<String, Metalink>,
}

impl DownloadWorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package. An existing entry for the same identity is kept.
    ///
    /// Returns whether the package was added.
    pub fn insert(&mut self, metalink: Metalink) -> bool {
        if self.entries.contains_key(&metalink.identity) {
            return false;
        }
        self.entries.insert(metalink.identity.clone(), metalink);
        true
    }

    /// Remove and return an arbitrary package.
    pub fn pop(&mut self) -> Option<Metalink> {
        let identity = self.entries.keys().next()?.clone();
        self.entries.remove(&identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Metalink> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities still in the set, sorted.
    pub fn identities(&self) -> Vec<&str> {
        let mut identities: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        identities.sort_unstable();
        identities
    }
}

impl FromIterator<Metalink> for DownloadWorkSet {
    fn from_iter<I: IntoIterator<Item = Metalink>>(iter: I) -> Self {
        let mut set = Self::new();
        for metalink in iter {
            set.insert(metalink);
        }
        set
    }
}

impl Extend<Metalink> for DownloadWorkSet {
    fn extend<I: IntoIterator<Item = Metalink>>(&mut self, iter: I) {
        for metalink in iter {
            self.insert(metalink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_drains_each_entry_once() {
        let mut set: DownloadWorkSet = ["a", "b", "c"]
            .into_iter()
            .map(|id| Metalink::new(id, "1", format!("{}.pkg", id)))
            .collect();
        assert_eq!(set.len(), 3);

        let mut seen = Vec::new();
        while let Some(metalink) = set.pop() {
            seen.push(metalink.identity);
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(set.is_empty());
        assert!(set.pop().is_none());
    }

    #[test]
    fn test_first_insert_wins() {
        let mut set = DownloadWorkSet::new();
        assert!(set.insert(Metalink::new("a", "1", "a-1.pkg")));
        assert!(!set.insert(Metalink::new("a", "2", "a-2.pkg")));
        assert_eq!(set.get("a").unwrap().version, "1");
        assert!(set.contains("a"));
    }

    #[test]
    fn test_identities_are_sorted() {
        let set: DownloadWorkSet = ["zsh", "bash", "less"]
            .into_iter()
            .map(|id| Metalink::new(id, "1", format!("{}.pkg", id)))
            .collect();
        assert_eq!(set.identities(), vec!["bash", "less", "zsh"]);
    }
}
