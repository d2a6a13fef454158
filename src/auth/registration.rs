// Copyright (c) 2025 - Cowboy AI, Inc.

//! Mobile device enrollment
//!
//! `register` stores a pending registration and sends a verification code
//! out-of-band to the supplied email address; `verify` matches the code,
//! creates the tenant if absent (tenant id derived from the email hash),
//! creates the device as UNVERIFIED, and mints initial tokens. A later
//! device-flow approval promotes the device to TRUSTED.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::embeddings::EmbeddingRegistry;
use crate::models::{derived_device_id, derived_tenant_id, Device, Tenant, TrustLevel};
use crate::repository::{EntityStore, KvStore, TenantRepository};

use super::error::{AuthError, AuthResult};
use super::token::{TokenGrant, TokenService, TokenSubject};

/// Pending registration lifetime in seconds
const REGISTRATION_TTL: i64 = 600;

/// Out-of-band delivery of verification codes (external collaborator)
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification_code(&self, email: &str, code: &str) -> AuthResult<()>;
}

/// Email sender that only logs; used in tests and local development
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send_verification_code(&self, email: &str, code: &str) -> AuthResult<()> {
        info!(email, code, "Verification code (logging sender)");
        Ok(())
    }
}

/// Device attributes supplied at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub platform: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingRegistration {
    email: String,
    public_key: String,
    device_name: String,
    device_type: String,
    platform: String,
    verification_code: String,
}

/// Registration acknowledgment
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResponse {
    pub registration_id: String,
    pub message: String,
    pub expires_in: u64,
}

/// Tokens plus the tenant the device landed in
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedRegistration {
    #[serde(flatten)]
    pub grant: TokenGrant,
    pub tenant_id: String,
    pub device_id: String,
}

/// Mobile enrollment service
pub struct MobileRegistrationService {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn EntityStore>,
    embeddings: EmbeddingRegistry,
    tokens: Arc<TokenService>,
    email: Arc<dyn EmailSender>,
}

impl MobileRegistrationService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn EntityStore>,
        embeddings: EmbeddingRegistry,
        tokens: Arc<TokenService>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            kv,
            store,
            embeddings,
            tokens,
            email,
        }
    }

    /// Begin enrollment: persist the pending registration and send the
    /// verification code to the email address.
    pub async fn register(
        &self,
        email: &str,
        public_key_base64: &str,
        device_info: DeviceInfo,
    ) -> AuthResult<RegistrationResponse> {
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidRequest("invalid email".into()));
        }
        if public_key_base64.is_empty() {
            return Err(AuthError::InvalidRequest("missing public_key".into()));
        }

        let device_name = device_info.device_name.clone().unwrap_or_else(|| {
            format!(
                "{} {}",
                device_info.platform.as_deref().unwrap_or("Unknown"),
                device_info.model.as_deref().unwrap_or("Device")
            )
        });

        let pending = PendingRegistration {
            email: email.to_string(),
            public_key: public_key_base64.to_string(),
            device_name,
            device_type: device_info.device_type.unwrap_or_else(|| "mobile".into()),
            platform: device_info.platform.unwrap_or_else(|| "unknown".into()),
            verification_code: generate_verification_code(),
        };

        let registration_id = Uuid::now_v7().to_string();
        self.kv
            .put(
                &registration_key(&registration_id),
                serde_json::to_value(&pending)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
                Some(REGISTRATION_TTL),
            )
            .await?;

        self.email
            .send_verification_code(email, &pending.verification_code)
            .await?;

        info!(email, registration_id, "Device registration started");

        Ok(RegistrationResponse {
            registration_id,
            message: "Verification code sent".into(),
            expires_in: REGISTRATION_TTL as u64,
        })
    }

    /// Complete enrollment: on a code match, create tenant and device and
    /// mint initial tokens.
    pub async fn verify(
        &self,
        registration_id: &str,
        verification_code: &str,
    ) -> AuthResult<VerifiedRegistration> {
        let key = registration_key(registration_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Err(AuthError::InvalidGrant(
                "registration expired or unknown".into(),
            ));
        };
        let pending: PendingRegistration = serde_json::from_value(raw)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if pending.verification_code != verification_code.trim() {
            return Err(AuthError::InvalidGrant("verification code mismatch".into()));
        }

        let tenant_id = derived_tenant_id(&pending.email);
        let device_id = derived_device_id(
            &pending.email,
            &pending.device_name,
            &pending.device_type,
            &pending.platform,
            &pending.public_key,
        );

        // Tenant is created on first enrollment; its key is the first
        // device's key
        let tenants: TenantRepository<Tenant> =
            TenantRepository::global(self.store.clone(), self.embeddings.clone());
        let mut tenant = match tenants.get(&tenant_id).await? {
            Some(tenant) => tenant,
            None => Tenant::new(
                tenant_id.clone(),
                pending.email.clone(),
                pending.public_key.clone(),
            ),
        };
        tenant.device_ids.insert(device_id.clone());
        tenants.upsert(&tenant).await?;

        let devices: TenantRepository<Device> =
            TenantRepository::new(self.store.clone(), self.embeddings.clone(), &tenant_id);
        let now = Utc::now();
        let device = Device {
            device_id: device_id.clone(),
            tenant_id: tenant_id.clone(),
            email: pending.email.clone(),
            device_name: pending.device_name.clone(),
            device_type: pending.device_type.clone(),
            platform: pending.platform.clone(),
            public_key: pending.public_key.clone(),
            trust_level: TrustLevel::Unverified,
            created_at: now,
            last_seen: now,
        };
        devices.upsert(&device).await?;

        self.kv.delete(&key).await?;

        let mut subject = TokenSubject::for_tenant_device(
            &tenant_id,
            &device_id,
            "p8fs-mobile",
            vec!["read".into(), "write".into()],
        );
        subject.email = Some(pending.email.clone());
        let grant = self.tokens.issue(&subject).await?;

        info!(tenant_id, device_id, "Device registration verified");

        Ok(VerifiedRegistration {
            grant,
            tenant_id,
            device_id,
        })
    }
}

fn registration_key(registration_id: &str) -> String {
    format!("device_registration:{registration_id}")
}

/// Six-digit verification code
fn generate_verification_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000))
}
