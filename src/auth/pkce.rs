// Copyright (c) 2025 - Cowboy AI, Inc.

//! Authorization-code flow with mandatory PKCE
//!
//! OAuth 2.1 constraints: `response_type=code` only, `code_challenge`
//! required, `S256` the only accepted method. Codes are short-lived, bound
//! to `(client_id, redirect_uri, code_challenge)`, and redeemable once.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use crate::repository::KvStore;

use super::error::{AuthError, AuthResult};

/// Authorization code lifetime (~10 minutes)
const CODE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
struct AuthorizationCodeRecord {
    client_id: String,
    user_id: String,
    redirect_uri: String,
    scope: Vec<String>,
    code_challenge: String,
    expires_at: DateTime<Utc>,
    redeemed: bool,
}

/// Parameters of an authorization request
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: Vec<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// A redeemed authorization code's context
#[derive(Debug, Clone)]
pub struct RedeemedCode {
    pub user_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
}

/// Issues and redeems PKCE-bound authorization codes
pub struct AuthCodeService {
    kv: Arc<dyn KvStore>,
}

impl AuthCodeService {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Create an authorization code for an authenticated user
    pub async fn create(&self, request: &AuthorizeRequest) -> AuthResult<String> {
        if request.response_type != "code" {
            return Err(AuthError::UnsupportedResponseType(
                request.response_type.clone(),
            ));
        }

        let Some(code_challenge) = &request.code_challenge else {
            return Err(AuthError::InvalidRequest(
                "PKCE code_challenge is required".into(),
            ));
        };
        let method = request.code_challenge_method.as_deref().unwrap_or("S256");
        if method != "S256" {
            return Err(AuthError::InvalidRequest(
                "only S256 code_challenge_method is supported".into(),
            ));
        }

        let code = generate_code();
        let record = AuthorizationCodeRecord {
            client_id: request.client_id.clone(),
            user_id: request.user_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scope: request.scope.clone(),
            code_challenge: code_challenge.clone(),
            expires_at: Utc::now() + Duration::seconds(CODE_TTL_SECONDS),
            redeemed: false,
        };

        self.kv
            .put(
                &code_key(&code),
                serde_json::to_value(&record)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
                Some(CODE_TTL_SECONDS),
            )
            .await?;

        info!(client_id = %request.client_id, "Authorization code issued");
        Ok(code)
    }

    /// Exchange a code for its context, verifying the PKCE binding.
    ///
    /// The code must match its `(client_id, redirect_uri)` binding, must not
    /// have been redeemed, and `SHA256(code_verifier)` must equal the
    /// recorded challenge.
    pub async fn exchange(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> AuthResult<RedeemedCode> {
        let key = code_key(code);
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(AuthError::InvalidGrant("unknown authorization code".into()));
        };
        let mut record: AuthorizationCodeRecord = serde_json::from_value(raw)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if Utc::now() > record.expires_at {
            return Err(AuthError::InvalidGrant("authorization code expired".into()));
        }
        if record.redeemed {
            return Err(AuthError::InvalidGrant(
                "authorization code already redeemed".into(),
            ));
        }
        if record.client_id != client_id {
            return Err(AuthError::InvalidClient("client mismatch".into()));
        }
        if record.redirect_uri != redirect_uri {
            return Err(AuthError::InvalidGrant("redirect_uri mismatch".into()));
        }
        if s256_challenge(code_verifier) != record.code_challenge {
            return Err(AuthError::InvalidGrant("PKCE verification failed".into()));
        }

        record.redeemed = true;
        let remaining = (record.expires_at - Utc::now()).num_seconds().max(1);
        self.kv
            .put(
                &key,
                serde_json::to_value(&record)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
                Some(remaining),
            )
            .await?;

        Ok(RedeemedCode {
            user_id: record.user_id,
            client_id: record.client_id,
            scope: record.scope,
        })
    }
}

/// `BASE64URL(SHA256(verifier))` per RFC 7636
pub fn s256_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

fn code_key(code: &str) -> String {
    format!("auth_code:{code}")
}

fn generate_code() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
