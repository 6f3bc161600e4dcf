//! Redis-backed cache store.

use std::collections::HashMap;

use async_trait::async_trait;
use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;

use super::store::{CacheError, CacheStore};

/// Cache store over a shared Redis connection manager. The manager
/// reconnects on its own, so clones are cheap handles.
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url).map_err(CacheError::backend)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(CacheError::backend)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        let mut conn = self.manager.clone();
        conn.hgetall(key).await.map_err(CacheError::backend)
    }

    async fn hash_set_all(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(CacheError::backend)?;
        let _: bool = conn
            .expire(key, ttl_secs as i64)
            .await
            .map_err(CacheError::backend)?;
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        conn.hincr(key, field, delta)
            .await
            .map_err(CacheError::backend)
    }

    async fn counter_incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        conn.incr(key, 1).await.map_err(CacheError::backend)
    }

    async fn counter_set(&self, key: &str, value: i64, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(CacheError::backend)?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = conn.del(keys).await.map_err(CacheError::backend)?;
        Ok(())
    }
}
