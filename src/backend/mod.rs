//! Cache Backends
//!
//! One interface over two implementations: the process-local TTL cache and a
//! client for the cache service. The implementation is picked once, from
//! [`Config`], when the process starts.

mod fetch;
mod memory;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::cache::CacheStats;
use crate::config::{BackendKind, Config};
use crate::error::{CacheError, Result};
use crate::models::HealthResponse;

pub use fetch::{cache_key, fetch_through};
pub use memory::MemoryBackend;
pub use remote::RemoteBackend;

// == Cache Backend Trait ==
/// Operations every cache implementation provides.
///
/// `get` returns `Ok(None)` on a miss; errors are reserved for a backend that
/// could not answer at all.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value`. `ttl` of `None` uses the backend default and
    /// `Some(Duration::ZERO)` disables expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching the glob; returns how many were removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    /// Number of live entries.
    async fn size(&self) -> Result<usize>;

    async fn stats(&self) -> Result<CacheStats>;

    async fn health(&self) -> HealthResponse;

    /// Drops expired entries. Backends that expire on their own return 0.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Short name reported in stats and logs.
    fn mode(&self) -> &'static str;
}

// == Factory ==
/// Builds the backend selected by `config`.
pub fn build_backend(config: &Config) -> Result<Arc<dyn CacheBackend>> {
    match config.backend {
        BackendKind::Memory => {
            info!(
                max_entries = config.max_entries,
                default_ttl_secs = config.default_ttl,
                "using in-memory cache backend"
            );
            Ok(Arc::new(MemoryBackend::new(
                config.max_entries,
                config.default_ttl(),
            )))
        }
        BackendKind::Remote => {
            let url = config.remote_url.as_deref().ok_or_else(|| {
                CacheError::Config("REMOTE_CACHE_URL is not set".to_string())
            })?;
            info!(url, "using remote cache backend");
            Ok(Arc::new(RemoteBackend::new(url, config.remote_timeout())?))
        }
    }
}
