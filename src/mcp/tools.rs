// Copyright (c) 2025 - Cowboy AI, Inc.

//! MCP tool registry
//!
//! Tools are registered once at process start; each declares its input
//! schema and required scopes and runs with a tenant-scoped context.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::embeddings::EmbeddingRegistry;
use crate::errors::{PlatformError, PlatformResult};
use crate::models::{Moment, Resource};
use crate::repository::{EntityStore, Filter, OrderBy, QueryHint, TenantRepository};

/// Execution context derived from the caller's token
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tenant_id: String,
    pub user_id: String,
    pub scopes: Vec<String>,
}

/// A tool's public contract
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub required_scopes: Vec<&'static str>,
}

/// An invocable MCP tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, context: &ToolContext, arguments: &Value) -> PlatformResult<Value>;
}

/// Static tool registry, populated at process start
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in platform tools installed
    pub fn with_builtins(store: Arc<dyn EntityStore>, embeddings: EmbeddingRegistry) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AboutTool));
        registry.register(Arc::new(SearchContentTool {
            store: store.clone(),
            embeddings: embeddings.clone(),
        }));
        registry.register(Arc::new(GetMomentsTool { store, embeddings }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        definitions.sort_by_key(|d| d.name);
        definitions
    }
}

/// Server identity and capabilities
struct AboutTool;

#[async_trait]
impl Tool for AboutTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "about",
            description: "Server identity, version, and capabilities",
            input_schema: json!({"type": "object", "properties": {}}),
            required_scopes: vec![],
        }
    }

    async fn call(&self, context: &ToolContext, _arguments: &Value) -> PlatformResult<Value> {
        Ok(json!({
            "name": "p8fs",
            "version": crate::VERSION,
            "tenant": context.tenant_id,
            "capabilities": ["search_content", "get_moments"],
        }))
    }
}

/// Semantic search over the tenant's resources
struct SearchContentTool {
    store: Arc<dyn EntityStore>,
    embeddings: EmbeddingRegistry,
}

#[async_trait]
impl Tool for SearchContentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_content",
            description: "Semantic search over indexed content",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10},
                    "threshold": {"type": "number", "default": 0.1},
                    "hint": {"type": "string", "enum": ["semantic", "lexical"]}
                },
                "required": ["query"]
            }),
            required_scopes: vec!["read"],
        }
    }

    async fn call(&self, context: &ToolContext, arguments: &Value) -> PlatformResult<Value> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::BadMessage("missing query".into()))?;
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(10) as usize;
        let threshold = arguments
            .get("threshold")
            .and_then(Value::as_f64)
            .unwrap_or(0.1) as f32;
        let hint = match arguments.get("hint").and_then(Value::as_str) {
            Some("lexical") => QueryHint::Lexical,
            _ => QueryHint::Semantic,
        };

        let repo: TenantRepository<Resource> = TenantRepository::new(
            self.store.clone(),
            self.embeddings.clone(),
            &context.tenant_id,
        );
        let hits = repo.query(query, hint, limit, threshold).await?;

        Ok(json!({
            "query": query,
            "count": hits.len(),
            "results": hits
                .iter()
                .map(|hit| json!({
                    "id": hit.entity.id.to_string(),
                    "name": hit.entity.name,
                    "uri": hit.entity.uri,
                    "score": hit.score,
                    "content": hit.entity.content,
                }))
                .collect::<Vec<_>>(),
        }))
    }
}

/// Time-bounded moments, optionally filtered by type
struct GetMomentsTool {
    store: Arc<dyn EntityStore>,
    embeddings: EmbeddingRegistry,
}

#[async_trait]
impl Tool for GetMomentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_moments",
            description: "List recent moments, optionally filtered by moment type",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "moment_type": {"type": "string"},
                    "limit": {"type": "integer", "default": 20}
                }
            }),
            required_scopes: vec!["read"],
        }
    }

    async fn call(&self, context: &ToolContext, arguments: &Value) -> PlatformResult<Value> {
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(20) as usize;

        let mut filters = Vec::new();
        if let Some(moment_type) = arguments.get("moment_type").and_then(Value::as_str) {
            filters.push(Filter::Eq(
                "moment_type".into(),
                Value::String(moment_type.to_string()),
            ));
        }

        let repo: TenantRepository<Moment> = TenantRepository::new(
            self.store.clone(),
            self.embeddings.clone(),
            &context.tenant_id,
        );
        let moments = repo
            .select(
                &filters,
                limit,
                0,
                Some(OrderBy {
                    field: "resource_timestamp".into(),
                    descending: true,
                }),
            )
            .await?;

        Ok(json!({
            "count": moments.len(),
            "moments": moments
                .iter()
                .map(|m| json!({
                    "id": m.resource.id.to_string(),
                    "name": m.resource.name,
                    "moment_type": m.moment_type,
                    "starts": m.resource.resource_timestamp,
                    "ends": m.resource_ends_timestamp,
                    "topic_tags": m.topic_tags,
                }))
                .collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn context() -> ToolContext {
        ToolContext {
            tenant_id: "t1".into(),
            user_id: "t1".into(),
            scopes: vec!["read".into()],
        }
    }

    #[tokio::test]
    async fn test_builtin_registry() {
        let registry = ToolRegistry::with_builtins(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
        );
        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["about", "get_moments", "search_content"]);
        assert!(registry.get("about").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[tokio::test]
    async fn test_about_tool() {
        let registry = ToolRegistry::with_builtins(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
        );
        let about = registry.get("about").unwrap();
        let result = about.call(&context(), &json!({})).await.unwrap();
        assert_eq!(result["tenant"], "t1");
    }

    #[tokio::test]
    async fn test_search_tool_scopes_to_tenant() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let embeddings = EmbeddingRegistry::with_local_default();

        let repo: TenantRepository<Resource> =
            TenantRepository::new(store.clone(), embeddings.clone(), "t2");
        let foreign = Resource::new("t2", "r", "chunk", "secret notes", 0, "/buckets/t2/d/a.txt");
        repo.upsert(&foreign).await.unwrap();

        let registry = ToolRegistry::with_builtins(store, embeddings);
        let search = registry.get("search_content").unwrap();
        let result = search
            .call(&context(), &json!({"query": "secret notes", "threshold": 0.0}))
            .await
            .unwrap();
        // Tenant t1 sees nothing from t2
        assert_eq!(result["count"], 0);
    }
}
