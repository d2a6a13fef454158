// Copyright (c) 2025 - Cowboy AI, Inc.

//! Device authorization flow
//!
//! State machine: PENDING → APPROVED → CONSUMED, plus terminal EXPIRED.
//!
//! 1. `initiate` - desktop requests a device code and a short user code
//! 2. `approve` - mobile approves the user code, optionally proving device
//!    possession with an Ed25519 signature over a challenge
//! 3. `poll` - desktop exchanges the device code for tokens exactly once
//!
//! Pending state lives in KV under two keys with one TTL; both are written
//! on every transition and both are removed on deny. Lookups retry the
//! hyphenated form of a bare 8-character user code.

use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::embeddings::EmbeddingRegistry;
use crate::models::device_auth::{normalize_user_code, DeviceAuthStatus, PendingDeviceRequest};
use crate::models::{Device, TrustLevel};
use crate::repository::{EntityStore, KvStore, TenantRepository};

use super::error::{AuthError, AuthResult};
use super::token::{TokenGrant, TokenService, TokenSubject};

/// User code alphabet: unambiguous uppercase alphanumerics
const USER_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Device authorization response per RFC 8628, plus the QR payload
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: u64,
    pub interval: u64,
    /// Payload for the mobile app to encode as a QR image
    pub qr_code: String,
}

/// Device-flow state machine over KV storage
pub struct DeviceAuthService {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn EntityStore>,
    embeddings: EmbeddingRegistry,
    tokens: Arc<TokenService>,
    verification_base_url: String,
}

impl DeviceAuthService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn EntityStore>,
        embeddings: EmbeddingRegistry,
        tokens: Arc<TokenService>,
        verification_base_url: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            store,
            embeddings,
            tokens,
            verification_base_url: verification_base_url.into(),
        }
    }

    /// Start a device authorization: mint codes and persist the pending
    /// request under both KV keys with the flow TTL.
    pub async fn initiate(
        &self,
        client_id: &str,
        scope: Vec<String>,
    ) -> AuthResult<DeviceCodeResponse> {
        if client_id.is_empty() {
            return Err(AuthError::InvalidClient("missing client_id".into()));
        }

        let device_code = generate_device_code();
        let user_code = generate_user_code();

        let scope = if scope.is_empty() {
            vec!["read".to_string(), "write".to_string()]
        } else {
            scope
        };

        let request = PendingDeviceRequest::new_pending(
            device_code.clone(),
            user_code.clone(),
            client_id.to_string(),
            scope,
            PendingDeviceRequest::TTL_SECONDS,
        );
        self.write_both_keys(&request).await?;

        let verification_uri = format!("{}/auth/device", self.verification_base_url);
        let verification_uri_complete = format!("{verification_uri}?user_code={user_code}");

        info!(client_id, user_code, "Device authorization initiated");

        Ok(DeviceCodeResponse {
            device_code,
            user_code,
            verification_uri,
            qr_code: verification_uri_complete.clone(),
            verification_uri_complete,
            expires_in: PendingDeviceRequest::TTL_SECONDS as u64,
            interval: 5,
        })
    }

    /// Desktop poll: pending → `authorization_pending`, approved → tokens
    /// (transitioning to CONSUMED), consumed → `invalid_grant`.
    pub async fn poll(&self, device_code: &str, client_id: &str) -> AuthResult<TokenGrant> {
        let key = format!("device_auth:{device_code}");
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(AuthError::ExpiredToken);
        };
        let mut request: PendingDeviceRequest = serde_json::from_value(raw)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if request.client_id != client_id {
            return Err(AuthError::InvalidClient("client mismatch".into()));
        }
        if request.is_expired() {
            return Err(AuthError::ExpiredToken);
        }

        match request.status {
            DeviceAuthStatus::Pending => Err(AuthError::AuthorizationPending),
            DeviceAuthStatus::Expired => Err(AuthError::ExpiredToken),
            DeviceAuthStatus::Consumed => {
                Err(AuthError::InvalidGrant("device code already consumed".into()))
            }
            DeviceAuthStatus::Approved => {
                let Some((access_token, refresh_token)) = request.consume() else {
                    return Err(AuthError::InvalidGrant("request not consumable".into()));
                };
                let scope = request.scope.join(" ");
                self.write_both_keys(&request).await?;

                Ok(TokenGrant {
                    access_token,
                    token_type: "Bearer",
                    expires_in: super::token::ACCESS_TOKEN_TTL,
                    refresh_token: Some(refresh_token),
                    scope,
                })
            }
        }
    }

    /// Mobile approval, optionally signature-verified.
    ///
    /// When `challenge`/`signature` are present, the approving device must
    /// prove possession of its Ed25519 key; a bad signature rejects the call
    /// without any state transition. Approval promotes the device to TRUSTED.
    pub async fn approve(
        &self,
        user_code: &str,
        tenant_id: &str,
        device_id: &str,
        challenge: Option<&str>,
        signature: Option<&str>,
    ) -> AuthResult<()> {
        let mut device = self.load_device(tenant_id, device_id).await?;

        if let (Some(challenge), Some(signature)) = (challenge, signature) {
            verify_device_signature(&device.public_key, challenge, signature)?;
            info!(device_id, "Device-bound authentication verified");
        }

        let mut request = self.load_by_user_code(user_code).await?;
        if request.is_expired() {
            return Err(AuthError::ExpiredToken);
        }
        if request.status != DeviceAuthStatus::Pending {
            return Err(AuthError::InvalidGrant(format!(
                "request not pending: {:?}",
                request.status
            )));
        }

        let subject = TokenSubject::for_tenant_device(
            tenant_id,
            device_id,
            &request.client_id,
            request.scope.clone(),
        );
        let grant = self.tokens.issue(&subject).await?;

        request.approve(
            tenant_id,
            device_id,
            grant.access_token,
            grant.refresh_token.unwrap_or_default(),
        );
        self.write_both_keys(&request).await?;

        // Approving from a device proves the enrollment end to end
        device.promote(TrustLevel::Trusted);
        device.touch();
        let repo: TenantRepository<Device> =
            TenantRepository::new(self.store.clone(), self.embeddings.clone(), tenant_id);
        repo.upsert(&device).await?;

        info!(user_code, tenant_id, "Device authorization approved");
        Ok(())
    }

    /// Deny the request, removing both KV keys
    pub async fn deny(&self, user_code: &str) -> AuthResult<()> {
        let request = self.load_by_user_code(user_code).await?;
        self.kv.delete(&request.storage_key()).await?;
        self.kv.delete(&request.user_code_key()).await?;
        info!(user_code, "Device authorization denied");
        Ok(())
    }

    async fn load_device(&self, tenant_id: &str, device_id: &str) -> AuthResult<Device> {
        let repo: TenantRepository<Device> =
            TenantRepository::new(self.store.clone(), self.embeddings.clone(), tenant_id);
        repo.get(device_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("approving device not found".into()))
    }

    /// Dereference a user code, retrying the hyphenated form when the bare
    /// 8-character shape was supplied.
    async fn load_by_user_code(&self, user_code: &str) -> AuthResult<PendingDeviceRequest> {
        let supplied = user_code.trim().to_ascii_uppercase();
        let mut pointer = self.kv.get(&format!("user_code:{supplied}")).await?;
        if pointer.is_none() {
            let normalized = normalize_user_code(&supplied);
            if normalized != supplied {
                pointer = self.kv.get(&format!("user_code:{normalized}")).await?;
            }
        }

        let Some(pointer) = pointer else {
            return Err(AuthError::InvalidGrant("unknown user code".into()));
        };
        let device_code = pointer
            .get("device_code")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Internal("malformed user code pointer".into()))?;

        let Some(raw) = self.kv.get(&format!("device_auth:{device_code}")).await? else {
            return Err(AuthError::ExpiredToken);
        };
        serde_json::from_value(raw).map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Persist the request under both keys with its remaining TTL
    async fn write_both_keys(&self, request: &PendingDeviceRequest) -> AuthResult<()> {
        let remaining = (request.expires_at - chrono::Utc::now())
            .num_seconds()
            .max(1);
        let value = serde_json::to_value(request)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        self.kv
            .put(&request.storage_key(), value, Some(remaining))
            .await?;
        self.kv
            .put(
                &request.user_code_key(),
                serde_json::json!({"device_code": request.device_code}),
                Some(remaining),
            )
            .await?;
        Ok(())
    }
}

/// Verify an Ed25519 approval signature against a device's public key
fn verify_device_signature(
    public_key_base64: &str,
    challenge: &str,
    signature_base64: &str,
) -> AuthResult<()> {
    let key_bytes = STANDARD
        .decode(public_key_base64)
        .map_err(|_| AuthError::SignatureInvalid)?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| AuthError::SignatureInvalid)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::SignatureInvalid)?;

    let signature_bytes = STANDARD
        .decode(signature_base64)
        .map_err(|_| AuthError::SignatureInvalid)?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| AuthError::SignatureInvalid)?;

    verifying_key
        .verify(challenge.as_bytes(), &signature)
        .map_err(|_| {
            warn!("Invalid signature for device approval");
            AuthError::SignatureInvalid
        })
}

/// ≥128 bits of opaque randomness, base64url
fn generate_device_code() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 8 alphanumerics with a hyphen after 4: `XXXX-YYYY`
fn generate_user_code() -> String {
    let mut rng = OsRng;
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..USER_CODE_CHARSET.len());
        code.push(USER_CODE_CHARSET[idx] as char);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_code_format() {
        for _ in 0..50 {
            let code = generate_user_code();
            assert_eq!(code.len(), 9);
            assert_eq!(code.as_bytes()[4], b'-');
            assert!(code
                .chars()
                .filter(|c| *c != '-')
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_device_code_entropy() {
        let a = generate_device_code();
        let b = generate_device_code();
        assert_ne!(a, b);
        // 32 bytes base64url without padding
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_signature_verification_round_trip() {
        use ed25519_dalek::{Signer, SigningKey};

        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = STANDARD.encode(signing_key.verifying_key().to_bytes());

        let challenge = "approve:ABCD-EFGH";
        let signature = STANDARD.encode(signing_key.sign(challenge.as_bytes()).to_bytes());

        assert!(verify_device_signature(&public_key, challenge, &signature).is_ok());
        assert!(verify_device_signature(&public_key, "approve:OTHER", &signature).is_err());
        assert!(verify_device_signature(&public_key, challenge, "bm90LWEtc2ln").is_err());
    }
}
