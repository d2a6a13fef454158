// Copyright (c) 2025 - Cowboy AI, Inc.

//! Model introspection contract
//!
//! Every entity model describes itself through a static [`ModelSchema`]:
//! table name, key field, tenant isolation, embedding-bearing fields, and a
//! field-to-semantic-type mapping. The repository consumes this to plan
//! upserts and project search results; process-wide model knowledge lives in
//! an explicit [`ModelRegistry`] populated at startup rather than behind
//! singleton magic.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Semantic column types for model fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Json,
}

/// A field whose text content is embedded for semantic search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingField {
    /// Field name on the model
    pub field: &'static str,
    /// Embedding provider identifier; "default" resolves to the registry default
    pub provider: &'static str,
}

/// Static description of an entity model
#[derive(Debug, Clone)]
pub struct ModelSchema {
    /// Backing table name
    pub table_name: &'static str,

    /// Natural key field (primary id remains `id`)
    pub key_field: &'static str,

    /// Whether reads and writes must carry a tenant predicate
    pub tenant_isolated: bool,

    /// Fields whose content is embedded, with their providers
    pub embedding_fields: Vec<EmbeddingField>,

    /// Field name to semantic type mapping
    pub fields: Vec<(&'static str, FieldType)>,
}

impl ModelSchema {
    /// Provider for a given embedding field, if the field is embedding-bearing
    pub fn embedding_provider(&self, field: &str) -> Option<&'static str> {
        self.embedding_fields
            .iter()
            .find(|f| f.field == field)
            .map(|f| f.provider)
    }
}

/// Trait implemented by every platform model
///
/// Models serialize to JSON rows; `id` is the stable primary identifier and
/// `tenant_id` the isolation scope (None for global models).
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Static schema for this model
    fn model_schema() -> ModelSchema;

    /// Primary identifier of this row
    fn id(&self) -> String;

    /// Owning tenant, None for global models
    fn tenant_id(&self) -> Option<&str>;
}

/// Process-wide registry of model schemas, keyed by table name
///
/// Populated explicitly at init (see [`crate::models::register_models`]).
#[derive(Clone, Default)]
pub struct ModelRegistry {
    schemas: Arc<DashMap<&'static str, ModelSchema>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            schemas: Arc::new(DashMap::new()),
        }
    }

    /// Register a model's schema under its table name
    pub fn register<M: Entity>(&self) {
        let schema = M::model_schema();
        self.schemas.insert(schema.table_name, schema);
    }

    /// Look up a schema by table name
    pub fn get(&self, table_name: &str) -> Option<ModelSchema> {
        self.schemas.get(table_name).map(|s| s.clone())
    }

    /// All registered table names
    pub fn tables(&self) -> Vec<&'static str> {
        self.schemas.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Sample {
        id: String,
        tenant_id: String,
        body: String,
    }

    impl Entity for Sample {
        fn model_schema() -> ModelSchema {
            ModelSchema {
                table_name: "samples",
                key_field: "id",
                tenant_isolated: true,
                embedding_fields: vec![EmbeddingField {
                    field: "body",
                    provider: "default",
                }],
                fields: vec![
                    ("id", FieldType::Text),
                    ("tenant_id", FieldType::Text),
                    ("body", FieldType::Text),
                ],
            }
        }

        fn id(&self) -> String {
            self.id.clone()
        }

        fn tenant_id(&self) -> Option<&str> {
            Some(&self.tenant_id)
        }
    }

    #[test]
    fn test_registry_round_trip() {
        let registry = ModelRegistry::new();
        registry.register::<Sample>();

        let schema = registry.get("samples").unwrap();
        assert_eq!(schema.key_field, "id");
        assert_eq!(schema.embedding_provider("body"), Some("default"));
        assert_eq!(schema.embedding_provider("id"), None);
    }
}
