//! Response DTOs for the cache service API
//!
//! Defines the structure of outgoing HTTP response bodies. The remote
//! backend deserializes the same types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub key: String,
    /// The stored value, `null` when a null was stored
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
///
/// Deleting a missing key is not an error; `deleted` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub key: String,
    pub deleted: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, deleted: bool) -> Self {
        Self {
            key: key.into(),
            deleted,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidateResponse {
    /// Patterns that were applied, after placeholder substitution
    pub patterns: Vec<String>,
    /// Number of entries removed
    pub removed: usize,
}

/// Response body for DELETE /clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn new() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

impl Default for ClearResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Current number of live entries
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Backend serving the cache
    pub mode: String,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, mode: impl Into<String>) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            mode: mode.into(),
        }
    }
}

impl From<StatsResponse> for CacheStats {
    fn from(resp: StatsResponse) -> Self {
        CacheStats {
            hits: resp.hits,
            misses: resp.misses,
            evictions: resp.evictions,
            expirations: resp.expirations,
            total_entries: resp.total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub message: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self::with_status("healthy", message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status("unhealthy", message)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    fn with_status(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}
