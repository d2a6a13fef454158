// Copyright (c) 2025 - Cowboy AI, Inc.

//! Structured-document processing (Engrams)
//!
//! `.yaml`, `.yml`, and `.json` uploads may carry an Engram-shaped document:
//! a declarative batch of entity upserts, patches, and associations. A
//! document qualifies when it has a `kind` (or `p8Kind`) field; anything
//! else falls through to default chunking.
//!
//! Dispatch runs through a content-type-keyed [`DocumentProcessorRegistry`]
//! populated at startup.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{PlatformError, PlatformResult};
use crate::models::{InlineEdge, Resource};
use crate::repository::{Filter, TenantRepository};

/// Outcome of a structured-document processor run
#[derive(Debug, Clone)]
pub struct ProcessorResult {
    pub processor_used: String,
    pub engram_id: Option<Uuid>,
    pub upserts: usize,
    pub patches: usize,
    pub associations: usize,
}

/// A processor for one family of structured documents
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Content types this processor accepts
    fn content_types(&self) -> &[&'static str];

    /// Structural test on the parsed document
    fn matches(&self, document: &Value) -> bool;

    async fn process(
        &self,
        document: &Value,
        tenant_id: &str,
    ) -> PlatformResult<ProcessorResult>;
}

/// Content-type-keyed processor registry
#[derive(Default)]
pub struct DocumentProcessorRegistry {
    processors: Vec<Arc<dyn DocumentProcessor>>,
}

impl DocumentProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn DocumentProcessor>) {
        self.processors.push(processor);
    }

    /// Parse the raw document and run the first matching processor.
    ///
    /// Returns None when the document parses but no processor claims it
    /// (callers fall through to default chunking). Parse failures also
    /// yield None so malformed structured files get the default treatment.
    pub async fn process_document(
        &self,
        raw: &str,
        content_type: &str,
        tenant_id: &str,
    ) -> PlatformResult<Option<ProcessorResult>> {
        let document: Value = if content_type.contains("yaml") {
            match serde_yaml::from_str(raw) {
                Ok(doc) => doc,
                Err(e) => {
                    debug!("Not parseable as YAML: {e}");
                    return Ok(None);
                }
            }
        } else {
            match serde_json::from_str(raw) {
                Ok(doc) => doc,
                Err(e) => {
                    debug!("Not parseable as JSON: {e}");
                    return Ok(None);
                }
            }
        };

        for processor in &self.processors {
            if processor.content_types().contains(&content_type) && processor.matches(&document) {
                let result = processor.process(&document, tenant_id).await?;
                info!(
                    "Processed {} document: {} upserts, {} patches, {} associations",
                    result.processor_used, result.upserts, result.patches, result.associations
                );
                return Ok(Some(result));
            }
        }

        Ok(None)
    }
}

/// An Engram document
#[derive(Debug, Deserialize)]
struct EngramDocument {
    #[serde(default, alias = "p8Kind")]
    kind: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    entities: Vec<EngramEntity>,
    #[serde(default)]
    patches: Vec<EngramPatch>,
    #[serde(default)]
    associations: Vec<EngramAssociation>,
}

#[derive(Debug, Deserialize)]
struct EngramEntity {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct EngramPatch {
    /// Target row id, or name when id is absent
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    set: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EngramAssociation {
    src: String,
    dst: String,
    rel_type: String,
    #[serde(default = "default_association_weight")]
    weight: f64,
    #[serde(default)]
    properties: Map<String, Value>,
}

fn default_association_weight() -> f64 {
    0.5
}

/// The Engram processor: performs the document's batch against resources
pub struct EngramProcessor {
    resources: TenantRepository<Resource>,
}

impl EngramProcessor {
    pub fn new(resources: TenantRepository<Resource>) -> Self {
        Self { resources }
    }

    async fn find_by_name(&self, name: &str) -> PlatformResult<Option<Resource>> {
        let mut hits = self
            .resources
            .select(
                &[Filter::Eq("name".into(), Value::String(name.to_string()))],
                1,
                0,
                None,
            )
            .await?;
        Ok(hits.pop())
    }

    async fn apply_upserts(
        &self,
        engram: &EngramDocument,
        tenant_id: &str,
    ) -> PlatformResult<usize> {
        let source = engram.name.as_deref().unwrap_or("engram");
        let mut count = 0;

        for (i, entity) in engram.entities.iter().enumerate() {
            let mut resource = Resource::new(
                tenant_id,
                &entity.name,
                entity.category.as_deref().unwrap_or("engram"),
                entity.content.as_deref().unwrap_or_default(),
                i as u32,
                &format!("engram://{source}/{}", entity.name),
            );
            resource.summary = entity.summary.clone();
            if let Some(metadata) = &entity.metadata {
                resource.metadata = metadata.clone();
            }
            self.resources.upsert(&resource).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn apply_patches(&self, engram: &EngramDocument) -> PlatformResult<usize> {
        let mut count = 0;

        for patch in &engram.patches {
            let existing = match (&patch.id, &patch.name) {
                (Some(id), _) => self.resources.get(id).await?,
                (None, Some(name)) => self.find_by_name(name).await?,
                (None, None) => None,
            };

            let Some(resource) = existing else {
                debug!("Patch target not found: {:?}/{:?}", patch.id, patch.name);
                continue;
            };

            let mut row = serde_json::to_value(&resource)?;
            if let Value::Object(map) = &mut row {
                for (key, value) in &patch.set {
                    map.insert(key.clone(), value.clone());
                }
            }
            let patched: Resource = serde_json::from_value(row)
                .map_err(|e| PlatformError::Deserialization(e.to_string()))?;
            self.resources.upsert(&patched).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn apply_associations(
        &self,
        engram: &EngramDocument,
        tenant_id: &str,
    ) -> PlatformResult<usize> {
        let mut count = 0;

        for association in &engram.associations {
            let Some(mut source) = self.find_by_name(&association.src).await? else {
                debug!("Association source not found: {}", association.src);
                continue;
            };

            let mut edge = InlineEdge::new(
                association.dst.clone(),
                association.rel_type.clone(),
                association.weight,
            );
            edge.properties = association.properties.clone();

            // Unresolved targets get a lightweight placeholder row carrying
            // the inverse edge.
            if self.find_by_name(&association.dst).await?.is_none() {
                let orphan = edge.to_orphan_resource(tenant_id, &source.name);
                self.resources.upsert(&orphan).await?;
            }

            source
                .graph_paths
                .retain(|e| !(e.dst == edge.dst && e.rel_type == edge.rel_type));
            source.graph_paths.push(edge);
            self.resources.upsert(&source).await?;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl DocumentProcessor for EngramProcessor {
    fn name(&self) -> &str {
        "engram"
    }

    fn content_types(&self) -> &[&'static str] {
        &["application/json", "application/x-yaml"]
    }

    fn matches(&self, document: &Value) -> bool {
        document.get("kind").is_some() || document.get("p8Kind").is_some()
    }

    async fn process(
        &self,
        document: &Value,
        tenant_id: &str,
    ) -> PlatformResult<ProcessorResult> {
        let engram: EngramDocument = serde_json::from_value(document.clone())
            .map_err(|e| PlatformError::BadMessage(format!("malformed engram: {e}")))?;

        let kind = engram.kind.as_deref().unwrap_or("Engram");
        let engram_id = Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!(
                "{tenant_id}:{kind}:{}",
                engram.name.as_deref().unwrap_or("unnamed")
            )
            .as_bytes(),
        );

        let upserts = self.apply_upserts(&engram, tenant_id).await?;
        let patches = self.apply_patches(&engram).await?;
        let associations = self.apply_associations(&engram, tenant_id).await?;

        Ok(ProcessorResult {
            processor_used: "engram".into(),
            engram_id: Some(engram_id),
            upserts,
            patches,
            associations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingRegistry;
    use crate::repository::MemoryStore;

    fn processor() -> (EngramProcessor, TenantRepository<Resource>) {
        let repo: TenantRepository<Resource> = TenantRepository::new(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
            "t1",
        );
        (EngramProcessor::new(repo.clone()), repo)
    }

    fn registry(processor: EngramProcessor) -> DocumentProcessorRegistry {
        let mut registry = DocumentProcessorRegistry::new();
        registry.register(Arc::new(processor));
        registry
    }

    #[tokio::test]
    async fn test_engram_upserts_and_associations() {
        let (engram, repo) = processor();
        let registry = registry(engram);

        let doc = r#"
kind: Engram
name: project-notes
entities:
  - name: "TiDB Migration Spec"
    category: document
    content: "Spec for the TiDB migration"
associations:
  - src: "TiDB Migration Spec"
    dst: "Sarah Chen"
    rel_type: authored-by
    weight: 1.0
"#;
        let result = registry
            .process_document(doc, "application/x-yaml", "t1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.processor_used, "engram");
        assert_eq!(result.upserts, 1);
        assert_eq!(result.associations, 1);

        // The source row carries the edge, the orphan target exists
        let spec = repo
            .select(
                &[Filter::Eq("name".into(), "TiDB Migration Spec".into())],
                1,
                0,
                None,
            )
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(spec.graph_paths.len(), 1);
        assert_eq!(spec.graph_paths[0].dst, "Sarah Chen");

        let orphan = repo
            .select(&[Filter::Eq("name".into(), "Sarah Chen".into())], 1, 0, None)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(orphan.graph_paths[0].rel_type, "inv-authored-by");
    }

    #[tokio::test]
    async fn test_plain_yaml_falls_through() {
        let (engram, _) = processor();
        let registry = registry(engram);

        let doc = "name: config\nvalue: 42\n";
        let result = registry
            .process_document(doc, "application/x-yaml", "t1")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_p8kind_alias_matches() {
        let (engram, _) = processor();
        let registry = registry(engram);

        let doc = r#"{"p8Kind": "Engram", "entities": [{"name": "A"}]}"#;
        let result = registry
            .process_document(doc, "application/json", "t1")
            .await
            .unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().upserts, 1);
    }

    #[tokio::test]
    async fn test_patch_by_name() {
        let (engram, repo) = processor();

        let resource = Resource::new("t1", "target", "doc", "old", 0, "/buckets/t1/d/a.txt");
        repo.upsert(&resource).await.unwrap();

        let registry = registry(engram);
        let doc = r#"{"kind": "Engram", "patches": [{"name": "target", "set": {"summary": "patched"}}]}"#;
        let result = registry
            .process_document(doc, "application/json", "t1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.patches, 1);

        let patched = repo
            .select(&[Filter::Eq("name".into(), "target".into())], 1, 0, None)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(patched.summary.as_deref(), Some("patched"));
    }

    #[tokio::test]
    async fn test_malformed_yaml_falls_through() {
        let (engram, _) = processor();
        let registry = registry(engram);

        let result = registry
            .process_document("kind: [unclosed", "application/x-yaml", "t1")
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
