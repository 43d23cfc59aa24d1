//! Key Registry
//!
//! Tag index and dependency graph over cache keys. The registry only records
//! relationships; deleting entries is left to [`InvalidationRules`](super::InvalidationRules).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::cache::KeyPattern;

// == Key Registry ==
/// Which tags each key carries and which keys derive from which.
///
/// Ordered collections keep every listing deterministic.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    /// tag -> keys carrying it
    tags: BTreeMap<String, BTreeSet<String>>,
    /// key -> tags it carries
    key_tags: BTreeMap<String, BTreeSet<String>>,
    /// parent key -> keys to drop when the parent goes stale
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Tags ==
    /// Adds `tags` to `key`. Tags already on the key are kept.
    pub fn tag<I, S>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
            self.key_tags.entry(key.to_string()).or_default().insert(tag);
        }
    }

    pub fn keys_tagged(&self, tag: &str) -> Vec<String> {
        self.tags
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tags whose name matches `pattern`.
    pub fn tags_matching(&self, pattern: &KeyPattern) -> Vec<String> {
        self.tags
            .keys()
            .filter(|tag| pattern.matches(tag))
            .cloned()
            .collect()
    }

    // == Dependencies ==
    /// Records that `child` is derived from `parent`.
    pub fn add_dependency(&mut self, parent: &str, child: &str) {
        if parent == child {
            return;
        }
        self.dependents
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    /// Parent keys that match `pattern`.
    pub fn parents_matching(&self, pattern: &KeyPattern) -> Vec<String> {
        self.dependents
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect()
    }

    /// Every key reachable from `roots` through the dependency graph,
    /// transitively, without the roots themselves. Cycles are walked once.
    pub fn dependents_of(&self, roots: &[String]) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = roots.iter().map(String::as_str).collect();

        while let Some(key) = queue.pop_front() {
            if let Some(children) = self.dependents.get(key) {
                for child in children {
                    if seen.insert(child.as_str()) {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        seen.into_iter()
            .filter(|key| !roots.iter().any(|root| root.as_str() == *key))
            .map(str::to_string)
            .collect()
    }

    // == Forget ==
    /// Drops `key` from the tag index and removes the edges leaving it.
    ///
    /// Edges pointing at `key` stay, so a parent still reaches it if the key
    /// is cached again.
    pub fn forget(&mut self, key: &str) {
        if let Some(tags) = self.key_tags.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tags.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tags.remove(&tag);
                    }
                }
            }
        }
        self.dependents.remove(key);
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.key_tags.clear();
        self.dependents.clear();
    }
}
