//! Cache backend abstraction.
//!
//! The post read path needs a hash per post plus an integer view
//! counter. Both implementations expose the same small surface so the
//! protocol logic never cares which one is behind it.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// All fields of the hash at `key`. Empty map when absent.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;

    /// Writes every field and sets the key's TTL.
    async fn hash_set_all(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), CacheError>;

    /// Adds `delta` to an integer hash field, creating it when missing.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError>;

    /// Increments the integer at `key`, creating it at 1 when missing.
    /// Returns the post-increment value.
    async fn counter_incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Sets the integer at `key` and its TTL.
    async fn counter_set(&self, key: &str, value: i64, ttl_secs: u64) -> Result<(), CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
}
