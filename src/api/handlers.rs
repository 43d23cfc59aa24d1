//! API Handlers
//!
//! HTTP request handlers for each cache service endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::backend::{build_backend, CacheBackend, MemoryBackend};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::{InvalidationRules, KeyLinks};
use crate::models::{
    validate_key, ClearResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// Holds the one cache backend of the process and the invalidation rules.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn CacheBackend>,
    pub rules: Arc<InvalidationRules>,
}

impl AppState {
    /// Creates a new AppState around `cache` with the default rules.
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            cache,
            rules: Arc::new(InvalidationRules::with_defaults()),
        }
    }

    /// In-memory state, mostly for tests and embedding.
    pub fn in_memory(max_entries: usize, default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::new(max_entries, default_ttl)))
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(build_backend(config)?))
    }

    pub fn with_rules(mut self, rules: InvalidationRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value in the cache with optional TTL in seconds, tags and
/// parent keys.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.map(Duration::from_secs);
    let links = KeyLinks {
        tags: req.tags,
        depends_on: req.depends_on,
    };
    state
        .rules
        .set_tracked(state.cache.as_ref(), &req.key, req.value, ttl, &links)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Missing and expired keys answer 404; a stored `null` answers 200.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
///
/// Idempotent: deleting a missing key reports `deleted: false`.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let deleted = state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for POST /invalidate
///
/// Deletes by glob pattern, by event through the invalidation rules, or by
/// tags. Tag invalidation reports no patterns.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let response = match (req.pattern, req.event) {
        (Some(pattern), _) => {
            let removed = state.cache.delete_pattern(&pattern).await?;
            info!(pattern = %pattern, removed, "invalidated cache keys by pattern");
            InvalidateResponse {
                patterns: vec![pattern],
                removed,
            }
        }
        (None, Some(event)) => {
            let (patterns, removed) = state
                .rules
                .invalidate(state.cache.as_ref(), &event, &req.context)
                .await?;
            InvalidateResponse { patterns, removed }
        }
        (None, None) => {
            let removed = state
                .rules
                .invalidate_tags(state.cache.as_ref(), &req.tags)
                .await?;
            InvalidateResponse {
                patterns: Vec::new(),
                removed,
            }
        }
    };

    Ok(Json(response))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    state.cache.clear().await?;
    state.rules.forget_all().await;
    info!("cache cleared");
    Ok(Json(ClearResponse::new()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.cache.stats().await?;
    Ok(Json(StatsResponse::new(stats, state.cache.mode())))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.cache.health().await)
}
