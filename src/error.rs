//! Error types for the cache
//!
//! Provides unified error handling using thiserror. A cache miss is not an
//! error; it is `None`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and its HTTP service.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found (HTTP layer only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote cache failed or answered unexpectedly
    #[error("Remote cache error: {0}")]
    Remote(String),

    /// Configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Remote(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::InvalidPattern(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
