//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, insertion-order eviction
//! and glob pattern invalidation.

mod clock;
mod entry;
mod order;
mod pattern;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use order::InsertionOrder;
pub use pattern::KeyPattern;
pub use stats::CacheStats;
pub use store::TtlCache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
