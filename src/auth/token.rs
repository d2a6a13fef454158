// Copyright (c) 2025 - Cowboy AI, Inc.

//! Token issuance and verification
//!
//! Access tokens are short-lived RS256 JWTs. Refresh tokens are opaque,
//! persisted, and single-use: redeeming one rotates it within its family,
//! and presenting an already-consumed token is treated as replay, revoking
//! the entire family.
//!
//! # Device-flow compatibility
//!
//! A token whose `sub` begins with `tenant-` is a device-flow token and the
//! subject doubles as the tenant identifier when the `tenant` claim is
//! absent. New issuance always sets both; verification accepts both shapes
//! and nothing looser.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repository::KvStore;

use super::error::{AuthError, AuthResult};
use super::keys::JwtKeyManager;

/// Default access token lifetime in seconds
pub const ACCESS_TOKEN_TTL: u64 = 3600;

/// Refresh token lifetime in seconds (30 days)
const REFRESH_TOKEN_TTL: i64 = 30 * 24 * 3600;

/// Claims carried by platform access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Authenticated principal: tenant id for device flow, user id otherwise
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Space-separated scopes
    pub scope: String,
    pub client_id: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The principal a token is minted for
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub sub: String,
    pub tenant: Option<String>,
    pub device_id: Option<String>,
    pub client_id: String,
    pub scope: Vec<String>,
    /// RFC 8707 resource binding; recorded as `aud`, not yet enforced
    pub audience: Option<String>,
    pub email: Option<String>,
}

impl TokenSubject {
    /// Device-flow subject: the tenant is the principal
    pub fn for_tenant_device(
        tenant_id: &str,
        device_id: &str,
        client_id: &str,
        scope: Vec<String>,
    ) -> Self {
        Self {
            sub: tenant_id.to_string(),
            tenant: Some(tenant_id.to_string()),
            device_id: Some(device_id.to_string()),
            client_id: client_id.to_string(),
            scope,
            audience: None,
            email: None,
        }
    }
}

/// A successful token grant
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Verified token context attached to downstream operations
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub sub: String,
    pub tenant_id: String,
    pub device_id: Option<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub email: Option<String>,
    pub expires_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshRecord {
    family: Uuid,
    sub: String,
    tenant: Option<String>,
    device_id: Option<String>,
    client_id: String,
    scope: Vec<String>,
    consumed: bool,
}

/// Issues, refreshes, verifies, revokes, and introspects tokens
pub struct TokenService {
    keys: Arc<JwtKeyManager>,
    kv: Arc<dyn KvStore>,
    access_ttl: u64,
}

impl TokenService {
    pub fn new(keys: Arc<JwtKeyManager>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            keys,
            kv,
            access_ttl: ACCESS_TOKEN_TTL,
        }
    }

    /// Mint an access token and open a new refresh-token family
    pub async fn issue(&self, subject: &TokenSubject) -> AuthResult<TokenGrant> {
        let access_token = self.mint_access(subject)?;
        let refresh_token = self
            .store_refresh(subject, Uuid::now_v7())
            .await?;

        Ok(TokenGrant {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_ttl,
            refresh_token: Some(refresh_token),
            scope: subject.scope.join(" "),
        })
    }

    fn mint_access(&self, subject: &TokenSubject) -> AuthResult<String> {
        let now = Utc::now().timestamp() as u64;
        let claims = AccessTokenClaims {
            sub: subject.sub.clone(),
            tenant: subject.tenant.clone(),
            device_id: subject.device_id.clone(),
            scope: subject.scope.join(" "),
            client_id: subject.client_id.clone(),
            iat: now,
            exp: now + self.access_ttl,
            aud: subject.audience.clone(),
            email: subject.email.clone(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());

        encode(&header, &claims, self.keys.encoding_key())
            .map_err(|e| AuthError::Internal(format!("failed to sign JWT: {e}")))
    }

    async fn store_refresh(&self, subject: &TokenSubject, family: Uuid) -> AuthResult<String> {
        let token = opaque_token();
        let record = RefreshRecord {
            family,
            sub: subject.sub.clone(),
            tenant: subject.tenant.clone(),
            device_id: subject.device_id.clone(),
            client_id: subject.client_id.clone(),
            scope: subject.scope.clone(),
            consumed: false,
        };
        self.kv
            .put(
                &refresh_key(&token),
                serde_json::to_value(&record)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
                Some(REFRESH_TOKEN_TTL),
            )
            .await?;
        Ok(token)
    }

    /// Redeem a refresh token, rotating it within its family.
    ///
    /// A consumed token is replay: the whole family is revoked and the call
    /// fails with `invalid_grant`.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> AuthResult<TokenGrant> {
        let key = refresh_key(refresh_token);
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(AuthError::InvalidGrant("unknown refresh token".into()));
        };
        let mut record: RefreshRecord = serde_json::from_value(raw)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if record.client_id != client_id {
            return Err(AuthError::InvalidClient("client mismatch".into()));
        }

        if record.consumed {
            warn!(family = %record.family, "Refresh token replay detected, revoking family");
            self.revoke_family(record.family).await?;
            return Err(AuthError::InvalidGrant("refresh token reuse".into()));
        }

        // Mark the old token consumed; keep it around so replay is detectable
        record.consumed = true;
        self.kv
            .put(
                &key,
                serde_json::to_value(&record)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
                Some(REFRESH_TOKEN_TTL),
            )
            .await?;

        let subject = TokenSubject {
            sub: record.sub.clone(),
            tenant: record.tenant.clone(),
            device_id: record.device_id.clone(),
            client_id: record.client_id.clone(),
            scope: record.scope.clone(),
            audience: None,
            email: None,
        };

        let access_token = self.mint_access(&subject)?;
        let new_refresh = self.store_refresh(&subject, record.family).await?;

        Ok(TokenGrant {
            access_token,
            token_type: "Bearer",
            expires_in: self.access_ttl,
            refresh_token: Some(new_refresh),
            scope: subject.scope.join(" "),
        })
    }

    async fn revoke_family(&self, family: Uuid) -> AuthResult<()> {
        let entries = self.kv.scan("refresh:", usize::MAX).await?;
        for (key, value) in entries {
            let same_family = value
                .get("family")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                == Some(family);
            if same_family {
                self.kv.delete(&key).await?;
            }
        }
        Ok(())
    }

    /// Verify a bearer token: signature, expiry, and required claims
    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let mut validation = Validation::new(Algorithm::RS256);
        // `aud` is recorded at issuance but not yet enforced
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(token, &self.keys.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::Unauthorized(format!("token validation failed: {e}")),
            })?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AuthError::Unauthorized("token missing subject claim".into()));
        }

        // Device-flow shim: sub doubles as tenant when the claim is absent
        let tenant_id = match &claims.tenant {
            Some(tenant) => tenant.clone(),
            None if claims.sub.starts_with("tenant-") => {
                debug!("Device flow token detected: using sub as tenant_id");
                claims.sub.clone()
            }
            None => {
                return Err(AuthError::Unauthorized("token missing tenant claim".into()));
            }
        };

        Ok(VerifiedToken {
            sub: claims.sub,
            tenant_id,
            device_id: claims.device_id,
            client_id: claims.client_id,
            scopes: claims
                .scope
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            email: claims.email,
            expires_at: claims.exp,
        })
    }

    /// Best-effort revocation per RFC 7009: always reports success
    pub async fn revoke(&self, token: &str, _token_type_hint: Option<&str>) -> bool {
        match self.kv.delete(&refresh_key(token)).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Revocation error: {e}");
                false
            }
        }
    }

    /// Token introspection per RFC 7662
    pub async fn introspect(&self, token: &str) -> Value {
        match self.verify(token).await {
            Ok(verified) => json!({
                "active": true,
                "sub": verified.sub,
                "tenant": verified.tenant_id,
                "client_id": verified.client_id,
                "scope": verified.scopes.join(" "),
                "exp": verified.expires_at,
                "token_type": "Bearer",
            }),
            Err(_) => json!({"active": false}),
        }
    }
}

fn refresh_key(token: &str) -> String {
    format!("refresh:{token}")
}

/// 256 bits of randomness, base64url without padding
fn opaque_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
