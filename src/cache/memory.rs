//! In-process cache backend.
//!
//! Used by tests and as the fallback when no cache URL is configured
//! but caching is switched on. Expiry is checked lazily on access.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{CacheError, CacheStore};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_if_expired(&self, key: &str) {
        if let Some(entry) = self.entries.get(key)
            && entry.expired()
        {
            drop(entry);
            self.entries.remove(key);
        }
    }

    #[cfg(test)]
    fn force_expire(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() - Duration::from_secs(1));
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
        self.drop_if_expired(key);
        match self.entries.get(key).map(|entry| entry.value.clone()) {
            Some(Value::Hash(fields)) => Ok(fields),
            Some(Value::Counter(_)) => Err(CacheError::backend("wrong type: expected hash")),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_set_all(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        let map = fields.iter().cloned().collect();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(map),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError> {
        self.drop_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(fields) => {
                let current = match fields.get(field) {
                    Some(raw) => raw
                        .parse::<i64>()
                        .map_err(|_| CacheError::backend("hash field is not an integer"))?,
                    None => 0,
                };
                let next = current + delta;
                fields.insert(field.to_string(), next.to_string());
                Ok(next)
            }
            Value::Counter(_) => Err(CacheError::backend("wrong type: expected hash")),
        }
    }

    async fn counter_incr(&self, key: &str) -> Result<i64, CacheError> {
        self.drop_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                Ok(*count)
            }
            Value::Hash(_) => Err(CacheError::backend("wrong type: expected counter")),
        }
    }

    async fn counter_set(&self, key: &str, value: i64, ttl_secs: u64) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Counter(value),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}
