//! Remote backend: a JSON-over-HTTP client for the cache service in
//! [`crate::api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::CacheBackend;
use crate::cache::CacheStats;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, ErrorResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, SetRequest, StatsResponse,
};

/// Cache backend that forwards every operation to a cache service.
///
/// Values travel as JSON. A 404 on read is a miss.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    http: Client,
    base_url: Url,
}

impl RemoteBackend {
    /// Creates a client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CacheError::Config(format!("invalid remote cache URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "remote cache URL '{base_url}' cannot be a base"
            )));
        }

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Config("remote cache URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let detail = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string(),
        };
        Err(CacheError::Remote(format!("{status}: {detail}")))
    }

    async fn fetch_health(&self) -> Result<HealthResponse> {
        let response = self.http.get(self.url(&["health"])?).send().await?;
        Self::decode(response).await
    }
}

/// TTL on the wire is whole seconds; a sub-second TTL rounds up so it never
/// turns into "no expiry".
fn ttl_to_wire_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

#[async_trait]
impl CacheBackend for RemoteBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let response = self.http.get(self.url(&["get", key])?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(key, "remote cache miss");
            return Ok(None);
        }
        let body: GetResponse = Self::decode(response).await?;
        Ok(Some(body.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let request = SetRequest::new(key, value, ttl.map(ttl_to_wire_secs));
        let response = self
            .http
            .put(self.url(&["set"])?)
            .json(&request)
            .send()
            .await?;
        Self::decode::<Value>(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self.http.delete(self.url(&["del", key])?).send().await?;
        let body: DeleteResponse = Self::decode(response).await?;
        Ok(body.deleted)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let response = self
            .http
            .post(self.url(&["invalidate"])?)
            .json(&InvalidateRequest::pattern(pattern))
            .send()
            .await?;
        let body: InvalidateResponse = Self::decode(response).await?;
        Ok(body.removed)
    }

    async fn clear(&self) -> Result<()> {
        let response = self.http.delete(self.url(&["clear"])?).send().await?;
        Self::decode::<Value>(response).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.stats().await?.total_entries)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let response = self.http.get(self.url(&["stats"])?).send().await?;
        let body: StatsResponse = Self::decode(response).await?;
        Ok(body.into())
    }

    async fn health(&self) -> HealthResponse {
        match self.fetch_health().await {
            Ok(health) => health,
            Err(e) => {
                warn!(error = %e, "remote cache health check failed");
                HealthResponse::unhealthy(format!("Remote cache unreachable: {e}"))
            }
        }
    }

    fn mode(&self) -> &'static str {
        "remote"
    }
}
