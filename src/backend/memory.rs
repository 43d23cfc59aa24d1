//! In-memory backend: one [`TtlCache`] shared behind an async lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::CacheBackend;
use crate::cache::{CacheStats, Clock, KeyPattern, SystemClock, TtlCache};
use crate::error::Result;
use crate::models::HealthResponse;

/// Process-local cache backend.
///
/// Clones share the same store. `get` returns a clone of the stored JSON
/// value, since a reference cannot outlive the lock guard.
#[derive(Debug)]
pub struct MemoryBackend<C = SystemClock> {
    cache: Arc<RwLock<TtlCache<Value, C>>>,
}

impl<C> Clone for MemoryBackend<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl MemoryBackend<SystemClock> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self::from_cache(TtlCache::new(max_entries, default_ttl))
    }
}

impl<C: Clock> MemoryBackend<C> {
    /// Wraps an existing store, e.g. one built on a manual clock.
    pub fn from_cache(cache: TtlCache<Value, C>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
        }
    }
}

#[async_trait]
impl<C: Clock + 'static> CacheBackend for MemoryBackend<C> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        // Write lock: a read may expire the entry and always updates stats.
        let mut cache = self.cache.write().await;
        Ok(cache.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.cache.write().await.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.cache.write().await.delete(key))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::compile(pattern)?;
        Ok(self.cache.write().await.delete_pattern(&pattern))
    }

    async fn clear(&self) -> Result<()> {
        self.cache.write().await.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.cache.write().await.len())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.cache.read().await.stats())
    }

    async fn health(&self) -> HealthResponse {
        let entries = self.cache.read().await.stats().total_entries;
        HealthResponse::healthy(format!("Using in-memory cache ({entries} entries)"))
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.cache.write().await.purge_expired())
    }

    fn mode(&self) -> &'static str {
        "memory"
    }
}
