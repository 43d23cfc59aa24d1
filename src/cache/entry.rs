//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

// == Cache Entry ==
/// A stored value and its validity window.
///
/// Timestamps are milliseconds read from the store's [`Clock`](super::Clock).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Insertion (or last overwrite) time
    pub inserted_at: u64,
    /// Expiration time, None = no expiration
    pub expires_at: Option<u64>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry inserted at `now_ms`.
    ///
    /// A zero `ttl` means the entry never expires, same as `None`.
    pub fn new(value: V, now_ms: u64, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| now_ms.saturating_add(duration_to_ms(ttl)));

        Self {
            value,
            inserted_at: now_ms,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once `now_ms >= expires_at`, so a TTL that has
    /// fully elapsed is never served.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
