// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TTL-keyed key-value store.
//!
//! Sessions (`session:{id}`) and the market-data cache
//! (`stock:price:{T}`, `stock:news:{T}`, ...) ride on the same store.
//! [`KeyValueStore`] is the seam: production uses [`RedisStore`] over a
//! managed connection, tests and single-node development use
//! [`MemoryStore`].

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum KvError {
    /// Could not reach the store
    #[error("KV connection failed: {0}")]
    Connection(String),

    /// A command failed after the connection was established
    #[error("KV operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            KvError::Connection(err.to_string())
        } else {
            KvError::Operation(err.to_string())
        }
    }
}

/// TTL-keyed key-value store interface.
///
/// Every entry carries an expiry; a `get` after the TTL behaves exactly
/// like a `get` of an absent key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Stores `value` under `key`, replacing any prior entry, with the
    /// given time-to-live.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Removes every key starting with `prefix`; returns how many were
    /// removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, KvError>;

    /// Fetches several keys in one round trip. The result is positional:
    /// `result[i]` corresponds to `keys[i]`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError>;
}

/// Redis-backed store using a managed (auto-reconnecting) connection.
pub struct RedisStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(|e| KvError::Connection(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        info!("Redis connection established");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        // Redis requires a TTL of at least one second
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, KvError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", prefix);

        // Cursor-based SCAN so large keyspaces are not blocked
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = keys.len() as u64;
        conn.del::<_, ()>(keys).await?;
        debug!(prefix = %prefix, removed = removed, "Removed keys by prefix");
        Ok(removed)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.manager.clone();
        // MGET with a single key returns a bulk value, not an array;
        // route it through GET to keep the decode uniform.
        if keys.len() == 1 {
            let value: Option<String> = conn.get(&keys[0]).await?;
            return Ok(vec![value]);
        }

        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }
}

/// In-process TTL store.
///
/// Used as the KV backend in tests and when `REDIS_URL` is unset.
/// Expiry is enforced lazily on read.
#[derive(Default)]
pub struct MemoryStore {
    entries: tokio::sync::Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, KvError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryStore::new();
        store
            .set_ex("session:abc", "user-1", Duration::from_secs(60))
            .await
            .unwrap();

        let value = store.get("session:abc").await.unwrap();
        assert_eq!(value, Some("user-1".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_miss() {
        let store = MemoryStore::new();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("short", "v", Duration::from_millis(20))
            .await
            .unwrap();

        assert!(store.get("short").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Deleting an absent key is fine
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_delete_prefix() {
        let store = MemoryStore::new();
        for ticker in ["AAPL", "MSFT", "GOOGL"] {
            store
                .set_ex(
                    &format!("stock:price:{}", ticker),
                    "{}",
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
        }
        store
            .set_ex("market:news", "[]", Duration::from_secs(60))
            .await
            .unwrap();

        let removed = store.delete_prefix("stock:price:").await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.get("stock:price:AAPL").await.unwrap(), None);
        assert!(store.get("market:news").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_store_mget_positional() {
        let store = MemoryStore::new();
        store
            .set_ex("a", "1", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_ex("c", "3", Duration::from_secs(60))
            .await
            .unwrap();

        let values = store
            .mget(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_memory_store_overwrite() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "old", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_ex("k", "new", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }
}
