// Copyright (c) 2025 - Cowboy AI, Inc.

//! MCP session gateway
//!
//! A tool-dispatch surface layered on the authorization core. Per request:
//! extract and validate the bearer token, then
//!
//! - `initialize` allocates an opaque session id bound to the token's
//!   tenant (returned to the client in the `Mcp-Session-Id` header),
//! - `tools/list` and `tools/call` require the session header and verify
//!   its tenant matches the token's tenant before dispatching.
//!
//! Tools run with a [`ToolContext`] carrying `{tenant_id, user_id, scopes}`
//! so every repository operation downstream is tenant-scoped.

pub mod tools;

pub use tools::{Tool, ToolContext, ToolDefinition, ToolRegistry};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult, TokenService, VerifiedToken};

#[derive(Debug, Clone)]
struct SessionRecord {
    tenant_id: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

/// Opaque session ids bound to tenants
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, token: &VerifiedToken) -> String {
        let session_id = Uuid::now_v7().simple().to_string();
        self.sessions.insert(
            session_id.clone(),
            SessionRecord {
                tenant_id: token.tenant_id.clone(),
                user_id: token.sub.clone(),
                created_at: Utc::now(),
            },
        );
        session_id
    }

    fn validate(&self, session_id: &str, token: &VerifiedToken) -> AuthResult<()> {
        let Some(session) = self.sessions.get(session_id) else {
            return Err(AuthError::Unauthorized("unknown session".into()));
        };
        if session.tenant_id != token.tenant_id {
            return Err(AuthError::Unauthorized(
                "session does not belong to this tenant".into(),
            ));
        }
        debug!(
            user = %session.user_id,
            age_secs = (Utc::now() - session.created_at).num_seconds(),
            "Session validated"
        );
        Ok(())
    }

    pub fn end(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}

/// Result of a successful `initialize`
#[derive(Debug, Clone, serde::Serialize)]
pub struct InitializeResult {
    /// Returned to the client in the `Mcp-Session-Id` response header
    pub session_id: String,
    pub protocol_version: &'static str,
    pub server_name: &'static str,
    pub server_version: &'static str,
}

/// Session-bound tool dispatch gateway
pub struct McpGateway {
    tokens: Arc<TokenService>,
    sessions: SessionManager,
    registry: Arc<ToolRegistry>,
}

impl McpGateway {
    pub fn new(tokens: Arc<TokenService>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            tokens,
            sessions: SessionManager::new(),
            registry,
        }
    }

    /// Validate the bearer token from the Authorization header
    async fn authenticate(&self, bearer_token: Option<&str>) -> AuthResult<VerifiedToken> {
        let Some(token) = bearer_token else {
            return Err(AuthError::Unauthorized("missing bearer token".into()));
        };
        self.tokens.verify(token).await
    }

    /// `initialize`: allocate a session bound to the token's tenant
    pub async fn initialize(&self, bearer_token: Option<&str>) -> AuthResult<InitializeResult> {
        let token = self.authenticate(bearer_token).await?;
        let session_id = self.sessions.create(&token);

        info!(tenant = %token.tenant_id, session = %session_id, "MCP session initialized");

        Ok(InitializeResult {
            session_id,
            protocol_version: "2024-11-05",
            server_name: "p8fs",
            server_version: crate::VERSION,
        })
    }

    /// `tools/list`: requires a session belonging to the token's tenant
    pub async fn tools_list(
        &self,
        bearer_token: Option<&str>,
        session_id: Option<&str>,
    ) -> AuthResult<Vec<ToolDefinition>> {
        let token = self.authenticate(bearer_token).await?;
        self.require_session(session_id, &token)?;
        Ok(self.registry.definitions())
    }

    /// `tools/call`: dispatch a named tool with the tenant context
    pub async fn tools_call(
        &self,
        bearer_token: Option<&str>,
        session_id: Option<&str>,
        tool_name: &str,
        arguments: &Value,
    ) -> AuthResult<Value> {
        let token = self.authenticate(bearer_token).await?;
        self.require_session(session_id, &token)?;

        let Some(tool) = self.registry.get(tool_name) else {
            return Err(AuthError::InvalidRequest(format!(
                "unknown tool: {tool_name}"
            )));
        };

        let definition = tool.definition();
        for required in &definition.required_scopes {
            if !token.scopes.iter().any(|s| s == required) {
                return Err(AuthError::Unauthorized(format!(
                    "missing scope: {required}"
                )));
            }
        }

        let context = ToolContext {
            tenant_id: token.tenant_id.clone(),
            user_id: token.sub.clone(),
            scopes: token.scopes.clone(),
        };

        debug!(tool = tool_name, tenant = %context.tenant_id, "Dispatching tool call");
        tool.call(&context, arguments)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    fn require_session(
        &self,
        session_id: Option<&str>,
        token: &VerifiedToken,
    ) -> AuthResult<()> {
        let Some(session_id) = session_id else {
            return Err(AuthError::Unauthorized("missing Mcp-Session-Id".into()));
        };
        self.sessions.validate(session_id, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{JwtKeyManager, TokenSubject};
    use crate::embeddings::EmbeddingRegistry;
    use crate::repository::{MemoryKvStore, MemoryStore};
    use serde_json::json;

    async fn gateway_and_token() -> (McpGateway, String) {
        let tokens = Arc::new(TokenService::new(
            Arc::new(JwtKeyManager::generate("test")),
            Arc::new(MemoryKvStore::new()),
        ));
        let registry = Arc::new(ToolRegistry::with_builtins(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
        ));
        let subject = TokenSubject::for_tenant_device(
            "tenant-gateway1test",
            "dev-1",
            "client-1",
            vec!["read".into()],
        );
        let grant = tokens.issue(&subject).await.unwrap();
        (McpGateway::new(tokens, registry), grant.access_token)
    }

    #[tokio::test]
    async fn test_initialize_then_call() {
        let (gateway, token) = gateway_and_token().await;

        let init = gateway.initialize(Some(&token)).await.unwrap();
        assert!(!init.session_id.is_empty());

        let tools = gateway
            .tools_list(Some(&token), Some(&init.session_id))
            .await
            .unwrap();
        assert_eq!(tools.len(), 3);

        let about = gateway
            .tools_call(Some(&token), Some(&init.session_id), "about", &json!({}))
            .await
            .unwrap();
        assert_eq!(about["tenant"], "tenant-gateway1test");
    }

    #[tokio::test]
    async fn test_missing_bearer_rejected() {
        let (gateway, _) = gateway_and_token().await;
        assert!(matches!(
            gateway.initialize(None).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_session_required_for_tools() {
        let (gateway, token) = gateway_and_token().await;
        gateway.initialize(Some(&token)).await.unwrap();

        assert!(matches!(
            gateway.tools_list(Some(&token), None).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            gateway
                .tools_call(Some(&token), Some("bogus-session"), "about", &json!({}))
                .await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_session_tenant_binding() {
        let (gateway, token_a) = gateway_and_token().await;
        let init = gateway.initialize(Some(&token_a)).await.unwrap();

        // A token for a different tenant cannot ride this session
        let other_subject = TokenSubject::for_tenant_device(
            "tenant-otherten01",
            "dev-2",
            "client-1",
            vec!["read".into()],
        );
        let other_grant = gateway.tokens.issue(&other_subject).await.unwrap();
        let result = gateway
            .tools_list(Some(&other_grant.access_token), Some(&init.session_id))
            .await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (gateway, token) = gateway_and_token().await;
        let init = gateway.initialize(Some(&token)).await.unwrap();
        let result = gateway
            .tools_call(Some(&token), Some(&init.session_id), "fly", &json!({}))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_scope_enforcement() {
        let tokens = Arc::new(TokenService::new(
            Arc::new(JwtKeyManager::generate("test")),
            Arc::new(MemoryKvStore::new()),
        ));
        let registry = Arc::new(ToolRegistry::with_builtins(
            Arc::new(MemoryStore::new()),
            EmbeddingRegistry::with_local_default(),
        ));
        // Token without the read scope
        let subject = TokenSubject::for_tenant_device(
            "tenant-noscopes001",
            "dev-1",
            "client-1",
            vec!["none".into()],
        );
        let grant = tokens.issue(&subject).await.unwrap();
        let gateway = McpGateway::new(tokens, registry);

        let init = gateway.initialize(Some(&grant.access_token)).await.unwrap();
        let result = gateway
            .tools_call(
                Some(&grant.access_token),
                Some(&init.session_id),
                "search_content",
                &json!({"query": "x"}),
            )
            .await;
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }
}
