//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with insertion-order eviction
//! and TTL expiration.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, Clock, InsertionOrder, KeyPattern, SystemClock};

// == TTL Cache ==
/// In-memory key/value store with per-entry TTL and a capacity bound.
///
/// - Expired entries are dropped lazily, when a read or a count touches them,
///   and by [`purge_expired`](Self::purge_expired).
/// - At capacity, inserting a new key evicts the oldest inserted entry.
///   Reads never change eviction order, and overwriting a live key keeps its
///   original slot.
/// - [`get`](Self::get) hands out a reference to the stored value. Callers
///   that mutate a clone of it do not affect the cache; callers holding
///   interior-mutable values (`Rc<RefCell<_>>` and friends) share them.
///
/// The store is single-owner and does no locking of its own; wrap it (as
/// `MemoryBackend` does) to share it between tasks.
#[derive(Debug)]
pub struct TtlCache<V, C = SystemClock> {
    entries: HashMap<String, CacheEntry<V>>,
    order: InsertionOrder,
    stats: CacheStats,
    max_entries: usize,
    default_ttl: Option<Duration>,
    clock: C,
}

impl<V> TtlCache<V, SystemClock> {
    // == Constructor ==
    /// Creates an empty cache on the wall clock.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries, at least 1
    /// * `default_ttl` - TTL for entries set without one; zero means entries
    ///   never expire unless given an explicit TTL
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self::with_clock(max_entries, default_ttl, SystemClock)
    }
}

impl<V, C: Clock> TtlCache<V, C> {
    /// Creates an empty cache reading time from `clock`.
    pub fn with_clock(max_entries: usize, default_ttl: Duration, clock: C) -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            default_ttl: (!default_ttl.is_zero()).then_some(default_ttl),
            clock,
        }
    }

    // == Set ==
    /// Stores a value under `key`.
    ///
    /// `ttl` of `None` applies the default TTL; `Some(Duration::ZERO)` stores
    /// the entry without expiry.
    ///
    /// Overwriting a live key replaces its value and timestamps in place and
    /// never evicts. A new key at capacity evicts exactly the oldest entry
    /// first. A key whose entry already expired counts as new.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = self.clock.now_ms();

        if self.entries.get(&key).is_some_and(|e| e.is_expired(now)) {
            self.remove_entry(&key);
            self.stats.record_expirations(1);
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        let entry = CacheEntry::new(value, now, ttl.or(self.default_ttl));
        self.order.record(&key);
        self.entries.insert(key, entry);

        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` if it is missing or
    /// expired. An expired entry is removed on the way out.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let now = self.clock.now_ms();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        self.entries.get(key).map(|entry| &entry.value)
    }

    // == Delete ==
    /// Removes the entry for `key`. Returns whether a live entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let now = self.clock.now_ms();

        match self.remove_entry(key) {
            Some(entry) if entry.is_expired(now) => {
                self.stats.record_expirations(1);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    // == Delete Pattern ==
    /// Removes every entry whose whole key matches `pattern`.
    ///
    /// Returns the number of live entries removed; matching entries that had
    /// already expired are dropped too but not counted.
    pub fn delete_pattern(&mut self, pattern: &KeyPattern) -> usize {
        let now = self.clock.now_ms();

        let matching: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();

        let mut removed = 0;
        for key in matching {
            if let Some(entry) = self.remove_entry(&key) {
                if entry.is_expired(now) {
                    self.stats.record_expirations(1);
                } else {
                    removed += 1;
                }
            }
        }

        debug!(pattern = pattern.as_str(), removed, "pattern delete");
        removed
    }

    // == Clear ==
    /// Removes every entry. Statistics counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.stats.set_total_entries(0);
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_ms();

        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_entry(&key);
        }

        self.stats.record_expirations(count);
        count
    }

    // == Length ==
    /// Returns the number of live entries, sweeping expired ones first.
    pub fn len(&mut self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    // == Stats ==
    /// Returns current cache statistics. `total_entries` counts live entries.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let mut stats = self.stats.clone();
        stats.set_total_entries(
            self.entries
                .values()
                .filter(|entry| !entry.is_expired(now))
                .count(),
        );
        stats
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_oldest() {
            self.entries.remove(&oldest);
            self.stats.record_eviction();
            debug!(key = %oldest, "evicted oldest entry");
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        self.stats.set_total_entries(self.entries.len());
        Some(entry)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::{json, Value};

    const MINUTE: Duration = Duration::from_secs(60);

    fn store_with_clock(max: usize, default_ttl: Duration) -> (TtlCache<Value, ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (TtlCache::with_clock(max, default_ttl, clock.clone()), clock)
    }

    fn pattern(glob: &str) -> KeyPattern {
        KeyPattern::compile(glob).unwrap()
    }

    #[test]
    fn test_miss_then_hit() {
        let (mut store, _) = store_with_clock(10, MINUTE);

        assert!(store.get("profile:7").is_none());
        store.set("profile:7", json!({"name": "Ana"}), Some(Duration::from_secs(30)));
        assert_eq!(store.get("profile:7"), Some(&json!({"name": "Ana"})));
    }

    #[test]
    fn test_ttl_expiration_on_fake_clock() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("k", json!("v"), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.get("k"), Some(&json!("v")));

        clock.advance(Duration::from_millis(1_000));
        assert!(store.get("k").is_none());
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_expired_get_removes_entry() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("k", json!(1), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(2));

        assert!(store.get("k").is_none());
        // Already swept by the read, nothing left for the purge.
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("forever", json!(true), Some(Duration::ZERO));
        clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));

        assert_eq!(store.get("forever"), Some(&json!(true)));
    }

    #[test]
    fn test_huge_ttl_is_far_future() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("k", json!(1), Some(Duration::from_secs(18_446_744_073_709_552)));
        clock.advance(Duration::from_secs(1));

        assert_eq!(store.get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_zero_default_ttl_means_no_expiry() {
        let (mut store, clock) = store_with_clock(10, Duration::ZERO);

        store.set("a", json!(1), None);
        store.set("b", json!(2), Some(Duration::from_secs(5)));
        clock.advance(Duration::from_secs(3600));

        assert_eq!(store.get("a"), Some(&json!(1)));
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_default_ttl_applies_when_none() {
        let (mut store, clock) = store_with_clock(10, Duration::from_secs(60));

        store.set("a", json!(1), None);
        clock.advance(Duration::from_secs(59));
        assert!(store.get("a").is_some());
        clock.advance(Duration::from_secs(1));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest_insertion() {
        let (mut store, _) = store_with_clock(2, MINUTE);

        store.set("a", json!(1), None);
        store.set("b", json!(2), None);
        store.set("c", json!(3), None);

        assert!(store.get("a").is_none());
        assert_eq!(store.get("b"), Some(&json!(2)));
        assert_eq!(store.get("c"), Some(&json!(3)));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_reads_do_not_change_eviction_order() {
        let (mut store, _) = store_with_clock(2, MINUTE);

        store.set("a", json!(1), None);
        store.set("b", json!(2), None);
        store.get("a");
        store.set("c", json!(3), None);

        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
    }

    #[test]
    fn test_overwrite_does_not_grow_or_evict() {
        let (mut store, _) = store_with_clock(1, MINUTE);

        store.set("a", json!(1), None);
        store.set("a", json!(2), None);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a"), Some(&json!(2)));
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_overwrite_keeps_eviction_position() {
        let (mut store, _) = store_with_clock(2, MINUTE);

        store.set("a", json!(1), None);
        store.set("b", json!(2), None);
        store.set("a", json!(10), None);
        store.set("c", json!(3), None);

        assert!(store.get("a").is_none(), "a was inserted first and is evicted");
        assert_eq!(store.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("a", json!(1), Some(Duration::from_secs(2)));
        clock.advance(Duration::from_secs(1));
        store.set("a", json!(2), Some(Duration::from_secs(2)));
        clock.advance(Duration::from_millis(1_500));

        assert_eq!(store.get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_set_on_expired_key_takes_new_slot() {
        let (mut store, clock) = store_with_clock(2, MINUTE);

        store.set("a", json!(1), Some(Duration::from_secs(1)));
        store.set("b", json!(2), None);
        clock.advance(Duration::from_secs(2));
        store.set("a", json!(3), None);
        store.set("c", json!(4), None);

        assert!(store.get("b").is_none(), "b is now the oldest insertion");
        assert_eq!(store.get("a"), Some(&json!(3)));
        assert_eq!(store.get("c"), Some(&json!(4)));
    }

    #[test]
    fn test_delete_pattern() {
        let (mut store, _) = store_with_clock(10, MINUTE);

        store.set("user:1", json!("a"), None);
        store.set("user:2", json!("b"), None);
        store.set("order:1", json!("c"), None);
        store.set("super_user:3", json!("d"), None);

        assert_eq!(store.delete_pattern(&pattern("user:*")), 2);
        assert!(store.get("user:1").is_none());
        assert!(store.get("user:2").is_none());
        assert!(store.get("order:1").is_some());
        assert!(store.get("super_user:3").is_some());
    }

    #[test]
    fn test_delete_pattern_no_match() {
        let (mut store, _) = store_with_clock(10, MINUTE);
        store.set("order:1", json!(1), None);

        assert_eq!(store.delete_pattern(&pattern("user:*")), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_pattern_skips_expired_in_count() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("user:1", json!(1), Some(Duration::from_secs(1)));
        store.set("user:2", json!(2), None);
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.delete_pattern(&pattern("user:*")), 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut store, _) = store_with_clock(10, MINUTE);

        assert!(!store.delete("missing"));
        store.set("k", json!(1), None);
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
    }

    #[test]
    fn test_delete_expired_reports_false() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("k", json!(1), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));

        assert!(!store.delete("k"));
    }

    #[test]
    fn test_clear_empties_fully() {
        let (mut store, _) = store_with_clock(10, MINUTE);

        for i in 0..5 {
            store.set(format!("k{i}"), json!(i), None);
        }
        store.clear();

        assert_eq!(store.len(), 0);
        for i in 0..5 {
            assert!(store.get(&format!("k{i}")).is_none());
        }
        // The tracker was reset as well: refilling evicts nothing early.
        for i in 0..10 {
            store.set(format!("n{i}"), json!(i), None);
        }
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_falsy_values_are_not_misses() {
        let (mut store, _) = store_with_clock(10, MINUTE);

        let falsy = [json!(null), json!(0), json!(false), json!("")];
        for (i, value) in falsy.iter().enumerate() {
            store.set(format!("f{i}"), value.clone(), None);
        }

        for (i, value) in falsy.iter().enumerate() {
            assert_eq!(store.get(&format!("f{i}")), Some(value));
        }
        assert_eq!(store.stats().misses, 0);
    }

    #[test]
    fn test_option_values_nest() {
        let clock = ManualClock::new(0);
        let mut store: TtlCache<Option<u32>, _> = TtlCache::with_clock(4, MINUTE, clock);

        store.set("none", None, None);
        assert_eq!(store.get("none"), Some(&None));
        assert_eq!(store.get("absent"), None);
    }

    #[test]
    fn test_len_counts_live_entries_only() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("short", json!(1), Some(Duration::from_secs(1)));
        store.set("long", json!(2), Some(Duration::from_secs(100)));
        assert_eq!(store.len(), 2);

        clock.advance(Duration::from_secs(5));
        assert_eq!(store.stats().total_entries, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_purge_expired() {
        let (mut store, clock) = store_with_clock(10, MINUTE);

        store.set("key1", json!(1), Some(Duration::from_secs(1)));
        store.set("key2", json!(2), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_millis(1_100));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }

    #[test]
    fn test_store_stats() {
        let (mut store, _) = store_with_clock(100, MINUTE);

        store.set("key1", json!("value1"), None);
        store.get("key1"); // hit
        store.get("nonexistent"); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (mut store, _) = store_with_clock(0, MINUTE);
        assert_eq!(store.max_entries(), 1);

        store.set("a", json!(1), None);
        store.set("b", json!(2), None);
        assert_eq!(store.len(), 1);
        assert!(store.get("b").is_some());
    }

    #[test]
    fn test_class_activities_scenario() {
        let mut store: TtlCache<Value> = TtlCache::new(3, MINUTE);

        let activities = json!([{"id": 1}, {"id": 2}]);
        store.set("class_activities_42", activities.clone(), None);
        assert_eq!(store.get("class_activities_42"), Some(&activities));

        assert_eq!(store.delete_pattern(&pattern("class_activities_*")), 1);
        assert!(store.get("class_activities_42").is_none());
    }
}
