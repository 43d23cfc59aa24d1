//! Read-through helpers for data-access code.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::CacheBackend;

/// Builds a cache key as `prefix:part:part...`.
///
/// ```
/// use edu_cache::backend::cache_key;
///
/// assert_eq!(cache_key("user:classes", ["7", "student"]), "user:classes:7:student");
/// assert_eq!(cache_key("class:activities", [42]), "class:activities:42");
/// ```
pub fn cache_key<I>(prefix: &str, parts: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let mut key = prefix.to_string();
    for part in parts {
        key.push(':');
        key.push_str(&part.to_string());
    }
    key
}

/// Returns the value cached under `key`, or runs `fetch`, caches its result
/// and returns it.
///
/// The cache never fails a read: backend errors and cached payloads that no
/// longer decode as `T` are logged and handled as a miss, and a failed write
/// after a successful fetch is only logged. Errors from `fetch` are returned
/// unchanged and nothing is cached.
pub async fn fetch_through<T, E, F, Fut>(
    cache: &dyn CacheBackend,
    key: &str,
    ttl: Option<Duration>,
    fetch: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match cache.get(key).await {
        Ok(Some(cached)) => match serde_json::from_value::<T>(cached) {
            Ok(value) => {
                debug!(key, "cache hit");
                return Ok(value);
            }
            Err(e) => warn!(key, error = %e, "cached value has unexpected shape, refetching"),
        },
        Ok(None) => debug!(key, "cache miss"),
        Err(e) => warn!(key, error = %e, "cache read failed, falling back to fetch"),
    }

    let value = fetch().await?;

    match serde_json::to_value(&value) {
        Ok(encoded) => {
            if let Err(e) = cache.set(key, encoded, ttl).await {
                warn!(key, error = %e, "cache write failed");
            }
        }
        Err(e) => warn!(key, error = %e, "fetched value could not be cached"),
    }

    Ok(value)
}
