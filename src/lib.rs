//! edu_cache - Read cache for the classroom platform backend
//!
//! A TTL cache with insertion-order eviction and glob pattern invalidation,
//! usable in-process or as a small HTTP service, behind one backend trait.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use backend::{build_backend, cache_key, fetch_through, CacheBackend};
pub use cache::TtlCache;
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationRules, KeyLinks};
pub use tasks::spawn_cleanup_task;
