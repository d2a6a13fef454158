// Copyright (c) 2025 - Cowboy AI, Inc.

//! Entity storage backend
//!
//! [`EntityStore`] is the persistence seam for entity rows: JSON documents
//! keyed by `(table, id)`. The default [`MemoryStore`] backs embedded
//! deployments and tests; concurrent upserts on the same id resolve by
//! last-write-wins on non-key fields.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::PlatformResult;

/// Row storage keyed by table and primary id
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch a row by id
    async fn get(&self, table: &str, id: &str) -> PlatformResult<Option<Value>>;

    /// Insert or replace a row
    async fn put(&self, table: &str, id: &str, row: Value) -> PlatformResult<()>;

    /// Delete a row; Ok(false) when absent
    async fn delete(&self, table: &str, id: &str) -> PlatformResult<bool>;

    /// All rows of a table (filtering happens above this seam)
    async fn scan(&self, table: &str) -> PlatformResult<Vec<Value>>;
}

/// In-memory entity store
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Arc<DashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Arc<DashMap<String, Value>> {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, table: &str, id: &str) -> PlatformResult<Option<Value>> {
        Ok(self.table(table).get(id).map(|row| row.clone()))
    }

    async fn put(&self, table: &str, id: &str, row: Value) -> PlatformResult<()> {
        self.table(table).insert(id.to_string(), row);
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> PlatformResult<bool> {
        Ok(self.table(table).remove(id).is_some())
    }

    async fn scan(&self, table: &str) -> PlatformResult<Vec<Value>> {
        Ok(self.table(table).iter().map(|e| e.value().clone()).collect())
    }
}
