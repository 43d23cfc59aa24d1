//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CacheError;

// == Backend Kind ==
/// Which cache implementation the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process-local TTL cache
    #[default]
    Memory,
    /// Cache service reached over HTTP
    Remote,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "remote" => Ok(BackendKind::Remote),
            other => Err(CacheError::Config(format!(
                "unknown CACHE_BACKEND '{other}', expected 'memory' or 'remote'"
            ))),
        }
    }
}

/// Cache and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL, 0 = no expiry
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Cache implementation to use
    pub backend: BackendKind,
    /// Base URL of the cache service, used by the remote backend
    pub remote_url: Option<String>,
    /// Request timeout for the remote backend in milliseconds
    pub remote_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds, 0 disables expiry (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `CACHE_BACKEND` - `memory` or `remote` (default: memory)
    /// - `REMOTE_CACHE_URL` - Cache service base URL (required for remote)
    /// - `REMOTE_TIMEOUT_MS` - Remote request timeout (default: 5000)
    ///
    /// Unparseable numbers fall back to their defaults; an unknown backend
    /// name or a remote backend without a URL is an error.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from any variable source, `from_env` reads the
    /// process environment through it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("CACHE_BACKEND") {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => defaults.backend,
        };

        let config = Self {
            max_entries: parse_or(lookup("MAX_ENTRIES"), defaults.max_entries),
            default_ttl: parse_or(lookup("DEFAULT_TTL"), defaults.default_ttl),
            server_port: parse_or(lookup("SERVER_PORT"), defaults.server_port),
            cleanup_interval: parse_or(lookup("CLEANUP_INTERVAL"), defaults.cleanup_interval),
            backend,
            remote_url: lookup("REMOTE_CACHE_URL").filter(|v| !v.is_empty()),
            remote_timeout_ms: parse_or(lookup("REMOTE_TIMEOUT_MS"), defaults.remote_timeout_ms),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.backend == BackendKind::Remote && self.remote_url.is_none() {
            return Err(CacheError::Config(
                "REMOTE_CACHE_URL must be set when CACHE_BACKEND=remote".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::Config("MAX_ENTRIES must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 1,
            backend: BackendKind::Memory,
            remote_url: None,
            remote_timeout_ms: 5000,
        }
    }
}
