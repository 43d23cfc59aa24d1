//! Invalidation Rules
//!
//! Maps mutation events (`activity:update`, `auth:logout`, ...) to the key
//! patterns that go stale when they happen, so mutation code can invalidate
//! by naming what changed instead of listing keys. Keys stored through
//! [`InvalidationRules::set_tracked`] can also carry tags and depend on other
//! keys; invalidating a tag or a parent drops them too.

mod registry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::CacheBackend;
use crate::cache::KeyPattern;
use crate::error::{CacheError, Result};

pub use registry::KeyRegistry;

// == Key Links ==
/// Tags and parent keys recorded for an entry stored with
/// [`InvalidationRules::set_tracked`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLinks {
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
}

impl KeyLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
        self.depends_on.push(parent.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.depends_on.is_empty()
    }
}

// == Invalidation Rules ==
/// Event name to key pattern table, plus the tag and dependency registry.
///
/// Patterns may contain `{name}` placeholders, filled from the context passed
/// at invalidation time. A placeholder with no value in the context is left
/// untouched and then only matches keys containing it literally.
///
/// Event invalidation can be switched off with [`set_enabled`](Self::set_enabled);
/// tag and dependency invalidation called directly always runs.
#[derive(Debug)]
pub struct InvalidationRules {
    rules: HashMap<String, Vec<String>>,
    registry: RwLock<KeyRegistry>,
    enabled: AtomicBool,
}

impl Default for InvalidationRules {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            registry: RwLock::new(KeyRegistry::new()),
            enabled: AtomicBool::new(true),
        }
    }
}

impl InvalidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the platform's resource families.
    pub fn with_defaults() -> Self {
        let mut rules = Self::new();

        rules.add_rule("user:update", ["user:*", "users:list", "dashboard:user:*"]);

        rules.add_rule(
            "activity:create",
            [
                "activities:list",
                "activities:recent",
                "dashboard:activities",
                "class_activities_{classId}",
            ],
        );
        rules.add_rule(
            "activity:update",
            [
                "activities:list",
                "activities:recent",
                "activity:*",
                "dashboard:activities",
                "class_activities_{classId}",
            ],
        );
        rules.add_rule(
            "activity:delete",
            [
                "activities:list",
                "activities:recent",
                "dashboard:activities",
                "class_activities_{classId}",
            ],
        );

        rules.add_rule(
            "meeting:create",
            ["meetings:list", "meetings:upcoming", "dashboard:meetings"],
        );
        rules.add_rule(
            "meeting:update",
            [
                "meetings:list",
                "meetings:upcoming",
                "meeting:*",
                "dashboard:meetings",
            ],
        );
        rules.add_rule(
            "meeting:delete",
            ["meetings:list", "meetings:upcoming", "dashboard:meetings"],
        );

        rules.add_rule("class:update", ["classes:list", "class:*", "dashboard:class:*"]);

        rules.add_rule("auth:logout", ["user:*", "dashboard:*", "notifications:*"]);

        rules
    }

    /// Sets the patterns for `event`, replacing any previous rule.
    pub fn add_rule<I, S>(&mut self, event: &str, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .insert(event.to_string(), patterns.into_iter().map(Into::into).collect());
    }

    pub fn has_rule(&self, event: &str) -> bool {
        self.rules.contains_key(event)
    }

    /// Patterns for `event` with placeholders filled from `context`.
    /// Unknown events yield no patterns.
    ///
    /// A context value containing `*` is rejected, it would widen the
    /// pattern past the single resource it names.
    pub fn patterns_for(&self, event: &str, context: &HashMap<String, String>) -> Result<Vec<String>> {
        match self.rules.get(event) {
            Some(patterns) => patterns
                .iter()
                .map(|pattern| substitute(pattern, context))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    // == Enable Switch ==
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "event invalidation toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    // == Tracked Writes ==
    /// Stores `value` and records its tags and parent keys.
    pub async fn set_tracked(
        &self,
        cache: &dyn CacheBackend,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        links: &KeyLinks,
    ) -> Result<()> {
        cache.set(key, value, ttl).await?;

        if !links.is_empty() {
            let mut registry = self.registry.write().await;
            registry.tag(key, links.tags.iter().cloned());
            for parent in &links.depends_on {
                registry.add_dependency(parent, key);
            }
        }
        Ok(())
    }

    pub async fn tag_key<I, S>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.write().await.tag(key, tags);
    }

    /// Records that `child` must be dropped whenever `parent` is invalidated.
    pub async fn add_dependency(&self, parent: &str, child: &str) {
        self.registry.write().await.add_dependency(parent, child);
    }

    /// Drops every recorded tag and dependency, for use after the cache
    /// itself was cleared.
    pub async fn forget_all(&self) {
        self.registry.write().await.clear();
    }

    // == Invalidation ==
    /// Deletes every key the rule for `event` covers, keys carrying a tag the
    /// patterns match, and everything depending on either.
    ///
    /// Returns the patterns applied and the total number of entries removed.
    /// While event invalidation is disabled nothing is applied.
    pub async fn invalidate(
        &self,
        cache: &dyn CacheBackend,
        event: &str,
        context: &HashMap<String, String>,
    ) -> Result<(Vec<String>, usize)> {
        if !self.is_enabled() {
            debug!(event, "event invalidation disabled, skipping");
            return Ok((Vec::new(), 0));
        }

        let patterns = self.patterns_for(event, context)?;

        let mut removed = 0;
        for pattern in &patterns {
            removed += cache.delete_pattern(pattern).await?;

            let glob = KeyPattern::compile(pattern)?;
            let (mut roots, tagged) = {
                let registry = self.registry.read().await;
                let tagged: Vec<String> = registry
                    .tags_matching(&glob)
                    .iter()
                    .flat_map(|tag| registry.keys_tagged(tag))
                    .collect();
                (registry.parents_matching(&glob), tagged)
            };
            roots.extend(tagged.iter().cloned());
            removed += self.drop_with_dependents(cache, &roots, &tagged).await?;
        }

        info!(event, removed, "invalidated cache keys for event");
        Ok((patterns, removed))
    }

    /// Deletes every key carrying one of `tags` and everything depending on
    /// those keys. Returns the number of entries removed.
    pub async fn invalidate_tags<I, S>(&self, cache: &dyn CacheBackend, tags: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<S> = tags.into_iter().collect();
        let tagged: Vec<String> = {
            let registry = self.registry.read().await;
            tags.iter()
                .flat_map(|tag| registry.keys_tagged(tag.as_ref()))
                .collect()
        };

        let removed = self.drop_with_dependents(cache, &tagged, &tagged).await?;
        info!(tags = tags.len(), removed, "invalidated cache keys by tag");
        Ok(removed)
    }

    /// Deletes everything depending on `key`, transitively, but not `key`
    /// itself. Returns the number of entries removed.
    pub async fn invalidate_dependents(&self, cache: &dyn CacheBackend, key: &str) -> Result<usize> {
        let roots = vec![key.to_string()];
        let removed = self.drop_with_dependents(cache, &roots, &[]).await?;
        debug!(key, removed, "invalidated dependent keys");
        Ok(removed)
    }

    /// Deletes `direct` and all dependents of `roots`, then forgets every
    /// key involved.
    async fn drop_with_dependents(
        &self,
        cache: &dyn CacheBackend,
        roots: &[String],
        direct: &[String],
    ) -> Result<usize> {
        if roots.is_empty() && direct.is_empty() {
            return Ok(0);
        }

        let dependents = self.registry.read().await.dependents_of(roots);

        let mut removed = 0;
        for key in direct.iter().chain(&dependents) {
            if cache.delete(key).await? {
                removed += 1;
            }
        }

        let mut registry = self.registry.write().await;
        for key in roots.iter().chain(direct).chain(&dependents) {
            registry.forget(key);
        }
        Ok(removed)
    }
}

/// Replaces each `{name}` token in one left-to-right pass. Substituted text
/// is never scanned again.
fn substitute(pattern: &str, context: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };

        let name = &after[..close];
        match context.get(name) {
            Some(value) if value.contains('*') => {
                return Err(CacheError::InvalidPattern(format!(
                    "value for '{{{name}}}' must not contain '*': {value}"
                )));
            }
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
