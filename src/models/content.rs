// Copyright (c) 2025 - Cowboy AI, Inc.

//! Content entity models: files, resources, moments, and inline graph edges
//!
//! Graph edges embed on their source entity by natural label rather than
//! hard reference, avoiding circular ownership. At query time a label is
//! resolved to 0..N entities in any table; `dst_entity_type` carries an
//! optional hint in the format `[table:]category[/subcategory]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use super::ids;
use super::schema::{EmbeddingField, Entity, FieldType, ModelSchema};
use crate::errors::{PlatformError, PlatformResult};

/// One row per ingested object-store file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Derived from `(tenant_id, uri)`
    pub id: Uuid,
    pub tenant_id: String,

    /// Full object-store path
    pub uri: String,

    pub file_size: u64,
    pub mime_type: Option<String>,
    pub content_hash: Option<String>,
    pub upload_timestamp: DateTime<Utc>,

    /// Metadata bag carrying at least the object-store key
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl FileRecord {
    pub fn new(tenant_id: &str, uri: &str, file_size: u64, mime_type: Option<String>) -> Self {
        Self {
            id: ids::file_id(tenant_id, uri),
            tenant_id: tenant_id.to_string(),
            uri: uri.to_string(),
            file_size,
            mime_type,
            content_hash: None,
            upload_timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }
}

impl Entity for FileRecord {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "files",
            key_field: "uri",
            tenant_isolated: true,
            embedding_fields: vec![],
            fields: vec![
                ("id", FieldType::Uuid),
                ("tenant_id", FieldType::Text),
                ("uri", FieldType::Text),
                ("file_size", FieldType::Integer),
                ("mime_type", FieldType::Text),
                ("content_hash", FieldType::Text),
                ("upload_timestamp", FieldType::Timestamp),
                ("metadata", FieldType::Json),
            ],
        }
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }
}

/// An inline knowledge-graph edge keyed by a human-readable destination label
///
/// Weight represents relationship strength in `[0, 1]`, not confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineEdge {
    /// Natural entity label, not a UUID
    pub dst: String,

    /// Relationship semantics, kebab-case
    pub rel_type: String,

    /// Relationship strength in [0, 1]
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Edge metadata; may carry `dst_entity_type`
    #[serde(default)]
    pub properties: Map<String, Value>,

    pub created_at: DateTime<Utc>,
}

fn default_weight() -> f64 {
    0.5
}

impl InlineEdge {
    pub fn new(dst: impl Into<String>, rel_type: impl Into<String>, weight: f64) -> Self {
        Self {
            dst: dst.into(),
            rel_type: rel_type.into(),
            weight: weight.clamp(0.0, 1.0),
            properties: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Parse `properties.dst_entity_type` into `(table, category)`.
    ///
    /// Format: `[table:]category[/subcategory]`; the table defaults to
    /// `resources` and the subcategory stays part of the category string.
    pub fn parse_entity_type(&self) -> (String, String) {
        let raw = self
            .properties
            .get("dst_entity_type")
            .and_then(Value::as_str)
            .unwrap_or("");

        match raw.split_once(':') {
            Some((table, category)) if !table.is_empty() => {
                (table.to_string(), category.to_string())
            }
            _ => ("resources".to_string(), raw.to_string()),
        }
    }

    /// Build a lightweight placeholder row for an unresolved edge target.
    ///
    /// The orphan carries the inverse edge back to the source so the link is
    /// traversable from both ends once the real entity appears.
    pub fn to_orphan_resource(&self, tenant_id: &str, source_name: &str) -> Resource {
        let (table_name, category) = self.parse_entity_type();

        let mut reverse = InlineEdge::new(source_name, format!("inv-{}", self.rel_type), self.weight);
        reverse
            .properties
            .insert("inverse_of".into(), Value::String(self.rel_type.clone()));

        let mut resource = Resource::new(
            tenant_id,
            &self.dst,
            &format!("edge-target:{table_name}"),
            &format!(
                "Lightweight node for '{}'. Will be enriched when the full entity is created.",
                self.dst
            ),
            0,
            &format!("orphan://{}/{}", table_name, self.dst),
        );
        resource.category = if category.is_empty() {
            Some(format!("edge-target:{table_name}"))
        } else {
            Some(category)
        };
        resource.metadata.insert("is_orphan".into(), Value::Bool(true));
        resource
            .metadata
            .insert("edge_rel_type".into(), Value::String(self.rel_type.clone()));
        resource.graph_paths = vec![reverse];
        resource
    }
}

/// A parsed content chunk with inline graph edges
///
/// `(tenant_id, uri, ordinal)` is unique; re-ingesting replaces the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Derived from `(tenant_id, uri, ordinal)` via the file id
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub category: Option<String>,

    /// Chunk text, embedded for semantic search
    pub content: String,
    pub summary: Option<String>,

    /// Zero-based position within the source file
    pub ordinal: u32,
    pub uri: String,
    pub resource_timestamp: Option<DateTime<Utc>>,

    /// Carries `file_id` plus parser metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Knowledge-graph edges, label-keyed
    #[serde(default)]
    pub graph_paths: Vec<InlineEdge>,
}

impl Resource {
    pub fn new(
        tenant_id: &str,
        name: &str,
        category: &str,
        content: &str,
        ordinal: u32,
        uri: &str,
    ) -> Self {
        let file = ids::file_id(tenant_id, uri);
        Self {
            id: ids::resource_id(&file, ordinal),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            category: Some(category.to_string()),
            content: content.to_string(),
            summary: None,
            ordinal,
            uri: uri.to_string(),
            resource_timestamp: None,
            metadata: Map::new(),
            graph_paths: Vec::new(),
        }
    }

    /// The owning file id recorded in the metadata bag, if any
    pub fn file_id(&self) -> Option<Uuid> {
        self.metadata
            .get("file_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

impl Entity for Resource {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "resources",
            key_field: "name",
            tenant_isolated: true,
            embedding_fields: vec![EmbeddingField {
                field: "content",
                provider: "default",
            }],
            fields: vec![
                ("id", FieldType::Uuid),
                ("tenant_id", FieldType::Text),
                ("name", FieldType::Text),
                ("category", FieldType::Text),
                ("content", FieldType::Text),
                ("summary", FieldType::Text),
                ("ordinal", FieldType::Integer),
                ("uri", FieldType::Text),
                ("resource_timestamp", FieldType::Timestamp),
                ("metadata", FieldType::Json),
                ("graph_paths", FieldType::Json),
            ],
        }
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }
}

/// A time-bounded resource carrying presence, topic, and emotion metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moment {
    #[serde(flatten)]
    pub resource: Resource,

    pub resource_ends_timestamp: Option<DateTime<Utc>>,

    /// Person fingerprint to person record
    #[serde(default)]
    pub present_persons: HashMap<String, Value>,

    pub moment_type: Option<String>,

    #[serde(default)]
    pub emotion_tags: Vec<String>,

    #[serde(default)]
    pub topic_tags: Vec<String>,

    pub location: Option<String>,
    pub speakers: Option<Value>,
}

impl Moment {
    /// Check the timestamp ordering invariant: start ≤ end when both are set
    pub fn validate(&self) -> PlatformResult<()> {
        if let (Some(start), Some(end)) =
            (self.resource.resource_timestamp, self.resource_ends_timestamp)
        {
            if start > end {
                return Err(PlatformError::Repository(format!(
                    "moment {} starts after it ends",
                    self.resource.id
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Moment {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "moments",
            key_field: "name",
            tenant_isolated: true,
            embedding_fields: vec![EmbeddingField {
                field: "content",
                provider: "default",
            }],
            fields: vec![
                ("id", FieldType::Uuid),
                ("tenant_id", FieldType::Text),
                ("name", FieldType::Text),
                ("category", FieldType::Text),
                ("content", FieldType::Text),
                ("summary", FieldType::Text),
                ("ordinal", FieldType::Integer),
                ("uri", FieldType::Text),
                ("resource_timestamp", FieldType::Timestamp),
                ("resource_ends_timestamp", FieldType::Timestamp),
                ("present_persons", FieldType::Json),
                ("moment_type", FieldType::Text),
                ("emotion_tags", FieldType::Json),
                ("topic_tags", FieldType::Json),
                ("location", FieldType::Text),
                ("speakers", FieldType::Json),
                ("metadata", FieldType::Json),
                ("graph_paths", FieldType::Json),
            ],
        }
    }

    fn id(&self) -> String {
        self.resource.id.to_string()
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.resource.tenant_id)
    }
}

/// Sidecar embedding row, keyed by `(entity_id, field_name, provider)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub entity_id: String,
    pub field_name: String,
    pub embedding_provider: String,
    pub embedding_vector: Vec<f32>,
    pub vector_dimension: usize,
    pub tenant_id: String,
}

impl EmbeddingRecord {
    pub fn new(
        entity_id: &str,
        field_name: &str,
        provider: &str,
        vector: Vec<f32>,
        tenant_id: &str,
    ) -> Self {
        Self {
            id: ids::embedding_id(entity_id, field_name, provider),
            entity_id: entity_id.to_string(),
            field_name: field_name.to_string(),
            embedding_provider: provider.to_string(),
            vector_dimension: vector.len(),
            embedding_vector: vector,
            tenant_id: tenant_id.to_string(),
        }
    }
}

impl Entity for EmbeddingRecord {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "embeddings",
            key_field: "id",
            tenant_isolated: true,
            embedding_fields: vec![],
            fields: vec![
                ("id", FieldType::Uuid),
                ("entity_id", FieldType::Text),
                ("field_name", FieldType::Text),
                ("embedding_provider", FieldType::Text),
                ("embedding_vector", FieldType::Json),
                ("vector_dimension", FieldType::Integer),
                ("tenant_id", FieldType::Text),
            ],
        }
    }

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }
}
