// Copyright (c) 2025 - Cowboy AI, Inc.

//! Ephemeral key-value storage with TTL
//!
//! Backs the device-authorization flow's pending state. TTL is a hard
//! contract: an expired key is never returned, regardless of whether the
//! backend has physically purged it yet.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::errors::PlatformResult;

/// TTL key-value storage
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value, optionally expiring after `ttl_seconds`
    async fn put(&self, key: &str, value: Value, ttl_seconds: Option<i64>) -> PlatformResult<()>;

    /// Fetch a live value; expired keys yield None
    async fn get(&self, key: &str) -> PlatformResult<Option<Value>>;

    /// Remove a key; Ok(false) when absent
    async fn delete(&self, key: &str) -> PlatformResult<bool>;

    /// Live keys (with values) under a prefix, up to `limit`
    async fn scan(&self, prefix: &str, limit: usize) -> PlatformResult<Vec<(String, Value)>>;
}

#[derive(Clone)]
struct KvEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

/// In-memory TTL store; expired entries are purged on access
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, KvEntry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Value, ttl_seconds: Option<i64>) -> PlatformResult<()> {
        let expires_at = ttl_seconds.map(|ttl| Utc::now() + Duration::seconds(ttl));
        self.entries
            .insert(key.to_string(), KvEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> PlatformResult<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> PlatformResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan(&self, prefix: &str, limit: usize) -> PlatformResult<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            if out.len() >= limit {
                break;
            }
            if entry.key().starts_with(prefix) && !entry.value().is_expired() {
                out.push((entry.key().clone(), entry.value().value.clone()));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_without_ttl() {
        let store = MemoryKvStore::new();
        store.put("k", json!({"a": 1}), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn test_expired_keys_are_not_returned() {
        let store = MemoryKvStore::new();
        store.put("gone", json!(1), Some(-1)).await.unwrap();
        assert!(store.get("gone").await.unwrap().is_none());

        store.put("alive", json!(2), Some(600)).await.unwrap();
        assert!(store.get("alive").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scan_prefix_skips_expired() {
        let store = MemoryKvStore::new();
        store.put("device_auth:a", json!(1), Some(600)).await.unwrap();
        store.put("device_auth:b", json!(2), Some(-1)).await.unwrap();
        store.put("user_code:c", json!(3), Some(600)).await.unwrap();

        let hits = store.scan("device_auth:", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "device_auth:a");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryKvStore::new();
        store.put("k", json!(1), None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
