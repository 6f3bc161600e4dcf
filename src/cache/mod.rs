//! Post read cache.
//!
//! Hot post reads are served from a per-post hash (`post:{id}`) with a
//! companion view counter (`post_view:{id}`). All maintenance runs as
//! background jobs; see `application::jobs`. Backends: Redis in
//! production, an in-process map for tests and cacheless setups.

mod keys;
mod memory;
mod post_cache;
mod redis;
mod store;

pub use keys::{post_key, view_key};
pub use memory::MemoryCacheStore;
pub use post_cache::{PostSnapshot, SnapshotError};
pub use redis::RedisCacheStore;
pub use store::{CacheError, CacheStore};

/// Default TTL for both cache keys.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Default number of buffered views flushed to the store in one write.
pub const DEFAULT_FLUSH_THRESHOLD: i64 = 10;
