// Copyright (c) 2025 - Cowboy AI, Inc.

//! Tenant-scoped entity repository
//!
//! [`TenantRepository`] is the only writer of entity state. It plans writes
//! from the model's [`ModelSchema`](crate::models::ModelSchema): which
//! fields carry embeddings (recomputed on every upsert), which key
//! identifies a row, and whether tenant isolation applies.
//!
//! # Tenant isolation
//!
//! For any model with `tenant_isolated = true`, every read and write carries
//! a tenant predicate derived from the caller's token. Constructing a
//! repository without a tenant context and touching an isolated model fails
//! with [`PlatformError::MissingTenantContext`] — there is no unscoped
//! escape hatch.

pub mod kv;
pub mod search;
pub mod store;

pub use kv::{KvStore, MemoryKvStore};
pub use search::{QueryHint, ScoredEntity};
pub use store::{EntityStore, MemoryStore};

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::EmbeddingRegistry;
use crate::errors::{PlatformError, PlatformResult};
use crate::models::{EmbeddingRecord, Entity};

/// Row filters: equality or JSON containment, no joins
#[derive(Debug, Clone)]
pub enum Filter {
    /// Field equals value
    Eq(String, Value),
    /// Field contains value: object superset, array membership, or substring
    Contains(String, Value),
}

impl Filter {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => row.get(field) == Some(expected),
            Filter::Contains(field, needle) => match row.get(field) {
                Some(Value::Object(map)) => needle
                    .as_object()
                    .is_some_and(|n| n.iter().all(|(k, v)| map.get(k) == Some(v))),
                Some(Value::Array(items)) => items.contains(needle),
                Some(Value::String(s)) => {
                    needle.as_str().is_some_and(|n| s.contains(n))
                }
                _ => false,
            },
        }
    }
}

/// Result ordering
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Tenant-scoped data access for one model
pub struct TenantRepository<M: Entity> {
    store: Arc<dyn EntityStore>,
    embeddings: EmbeddingRegistry,
    tenant: Option<String>,
    _model: PhantomData<M>,
}

impl<M: Entity> Clone for TenantRepository<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            embeddings: self.embeddings.clone(),
            tenant: self.tenant.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Entity> TenantRepository<M> {
    /// Repository scoped to a tenant
    pub fn new(
        store: Arc<dyn EntityStore>,
        embeddings: EmbeddingRegistry,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embeddings,
            tenant: Some(tenant_id.into()),
            _model: PhantomData,
        }
    }

    /// Repository without a tenant context; only valid for global models
    pub fn global(store: Arc<dyn EntityStore>, embeddings: EmbeddingRegistry) -> Self {
        Self {
            store,
            embeddings,
            tenant: None,
            _model: PhantomData,
        }
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub(crate) fn embeddings(&self) -> &EmbeddingRegistry {
        &self.embeddings
    }

    /// Tenant predicate for this model, enforced on every operation
    pub(crate) fn tenant_predicate(&self) -> PlatformResult<Option<&str>> {
        let schema = M::model_schema();
        if schema.tenant_isolated {
            match self.tenant.as_deref() {
                Some(tenant) => Ok(Some(tenant)),
                None => Err(PlatformError::MissingTenantContext(
                    schema.table_name.to_string(),
                )),
            }
        } else {
            Ok(None)
        }
    }

    fn row_in_scope(row: &Value, tenant: Option<&str>) -> bool {
        match tenant {
            Some(t) => row.get("tenant_id").and_then(Value::as_str) == Some(t),
            None => true,
        }
    }

    /// Fetch one entity by primary id
    pub async fn get(&self, id: &str) -> PlatformResult<Option<M>> {
        let tenant = self.tenant_predicate()?;
        let table = M::model_schema().table_name;

        let Some(row) = self.store.get(table, id).await? else {
            return Ok(None);
        };
        if !Self::row_in_scope(&row, tenant) {
            return Ok(None);
        }

        let entity = serde_json::from_value(row)
            .map_err(|e| PlatformError::Deserialization(e.to_string()))?;
        Ok(Some(entity))
    }

    /// Select entities matching all filters
    pub async fn select(
        &self,
        filters: &[Filter],
        limit: usize,
        offset: usize,
        order_by: Option<OrderBy>,
    ) -> PlatformResult<Vec<M>> {
        let tenant = self.tenant_predicate()?;
        let table = M::model_schema().table_name;

        let mut rows: Vec<Value> = self
            .store
            .scan(table)
            .await?
            .into_iter()
            .filter(|row| Self::row_in_scope(row, tenant))
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect();

        if let Some(order) = order_by {
            rows.sort_by(|a, b| {
                let ord = compare_fields(a.get(&order.field), b.get(&order.field));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| PlatformError::Deserialization(e.to_string()))
            })
            .collect()
    }

    /// Insert or replace an entity by primary id, recomputing embeddings
    /// for every embedding-bearing field.
    pub async fn upsert(&self, entity: &M) -> PlatformResult<String> {
        let tenant = self.tenant_predicate()?;
        let schema = M::model_schema();

        if let (Some(scope), Some(owner)) = (tenant, entity.tenant_id()) {
            if scope != owner {
                return Err(PlatformError::Repository(format!(
                    "entity belongs to {owner}, repository scoped to {scope}"
                )));
            }
        }

        let id = entity.id();
        let row = serde_json::to_value(entity)?;

        if let Some(existing) = self.store.get(schema.table_name, &id).await? {
            if existing != row {
                debug!(table = schema.table_name, id = %id, "Replacing row (last write wins)");
            }
        }

        self.store.put(schema.table_name, &id, row.clone()).await?;

        for embedding_field in &schema.embedding_fields {
            let Some(text) = row.get(embedding_field.field).and_then(Value::as_str) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            self.write_embedding(&id, embedding_field.field, embedding_field.provider, text)
                .await?;
        }

        Ok(id)
    }

    /// Upsert a batch; stops on the first failure
    pub async fn upsert_many(&self, entities: &[M]) -> PlatformResult<Vec<String>> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(self.upsert(entity).await?);
        }
        Ok(ids)
    }

    /// Delete an entity and its sidecar embedding rows
    pub async fn delete(&self, id: &str) -> PlatformResult<bool> {
        let tenant = self.tenant_predicate()?;
        let table = M::model_schema().table_name;

        if let Some(row) = self.store.get(table, id).await? {
            if !Self::row_in_scope(&row, tenant) {
                return Ok(false);
            }
        } else {
            return Ok(false);
        }

        let deleted = self.store.delete(table, id).await?;
        if deleted {
            self.delete_embeddings_for(id).await?;
        }
        Ok(deleted)
    }

    async fn write_embedding(
        &self,
        entity_id: &str,
        field: &str,
        provider_name: &str,
        text: &str,
    ) -> PlatformResult<()> {
        let provider = self.embeddings.get(provider_name)?;
        let vectors = provider.embed(&[text.to_string()]).await?;
        let Some(vector) = vectors.into_iter().next() else {
            return Err(PlatformError::EmbeddingUnavailable(format!(
                "provider {} returned no vector",
                provider.name()
            )));
        };

        let tenant = self.tenant.clone().unwrap_or_default();
        let record = EmbeddingRecord::new(entity_id, field, provider.name(), vector, &tenant);
        let record_id = record.id.to_string();
        let row = serde_json::to_value(&record)?;
        self.store.put("embeddings", &record_id, row).await
    }

    /// Remove every embedding row owned by an entity
    pub(crate) async fn delete_embeddings_for(&self, entity_id: &str) -> PlatformResult<()> {
        let rows = self.store.scan("embeddings").await?;
        for row in rows {
            if row.get("entity_id").and_then(Value::as_str) == Some(entity_id) {
                if let Some(id) = row.get("id").and_then(Value::as_str) {
                    if !self.store.delete("embeddings", id).await? {
                        warn!(entity_id, "embedding row vanished during cascade");
                    }
                }
            }
        }
        Ok(())
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(x), Some(y)) => {
            if let (Some(fx), Some(fy)) = (x.as_f64(), y.as_f64()) {
                fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
            } else {
                let sx = x.as_str().map(str::to_string).unwrap_or_else(|| x.to_string());
                let sy = y.as_str().map(str::to_string).unwrap_or_else(|| y.to_string());
                sx.cmp(&sy)
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
