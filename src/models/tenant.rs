// Copyright (c) 2025 - Cowboy AI, Inc.

//! Tenant and device models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::schema::{Entity, FieldType, ModelSchema};

/// A platform tenant (global model)
///
/// The tenant's public key is set at creation; rotation requires a
/// device-bound re-approval, never a plain update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Primary natural key, e.g. `tenant-a1b2c3d4e5f6`
    pub tenant_id: String,

    /// Unique contact address the tenant was derived from
    pub email: String,

    /// Base64-encoded 32-byte Ed25519 public key
    pub public_key: String,

    /// Enrolled device identifiers
    #[serde(default)]
    pub device_ids: BTreeSet<String>,

    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(tenant_id: String, email: String, public_key: String) -> Self {
        Self {
            tenant_id,
            email,
            public_key,
            device_ids: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Tenant {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "tenants",
            key_field: "tenant_id",
            tenant_isolated: false,
            embedding_fields: vec![],
            fields: vec![
                ("tenant_id", FieldType::Text),
                ("email", FieldType::Text),
                ("public_key", FieldType::Text),
                ("device_ids", FieldType::Json),
                ("created_at", FieldType::Timestamp),
            ],
        }
    }

    fn id(&self) -> String {
        self.tenant_id.clone()
    }

    fn tenant_id(&self) -> Option<&str> {
        None
    }
}

/// Device trust levels; a device's level only ever increases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Unverified,
    Trusted,
}

/// An enrolled device bound to a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Derived identifier (see [`super::ids::derived_device_id`])
    pub device_id: String,

    pub tenant_id: String,
    pub email: String,
    pub device_name: String,
    pub device_type: String,
    pub platform: String,

    /// Base64-encoded Ed25519 public key used to verify approvals
    pub public_key: String,

    pub trust_level: TrustLevel,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Raise the trust level; never lowers it
    pub fn promote(&mut self, level: TrustLevel) {
        if level > self.trust_level {
            self.trust_level = level;
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

impl Entity for Device {
    fn model_schema() -> ModelSchema {
        ModelSchema {
            table_name: "devices",
            key_field: "device_id",
            tenant_isolated: true,
            embedding_fields: vec![],
            fields: vec![
                ("device_id", FieldType::Text),
                ("tenant_id", FieldType::Text),
                ("email", FieldType::Text),
                ("device_name", FieldType::Text),
                ("device_type", FieldType::Text),
                ("platform", FieldType::Text),
                ("public_key", FieldType::Text),
                ("trust_level", FieldType::Text),
                ("created_at", FieldType::Timestamp),
                ("last_seen", FieldType::Timestamp),
            ],
        }
    }

    fn id(&self) -> String {
        self.device_id.clone()
    }

    fn tenant_id(&self) -> Option<&str> {
        Some(&self.tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            device_id: "abc123".into(),
            tenant_id: "tenant-x".into(),
            email: "a@b.c".into(),
            device_name: "Pixel".into(),
            device_type: "phone".into(),
            platform: "android".into(),
            public_key: "cGs=".into(),
            trust_level: TrustLevel::Unverified,
            created_at: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_trust_is_monotonic() {
        let mut d = device();
        d.promote(TrustLevel::Trusted);
        assert_eq!(d.trust_level, TrustLevel::Trusted);
        // Promotion never lowers trust
        d.promote(TrustLevel::Unverified);
        assert_eq!(d.trust_level, TrustLevel::Trusted);
    }

    #[test]
    fn test_trust_level_wire_format() {
        let json = serde_json::to_string(&TrustLevel::Unverified).unwrap();
        assert_eq!(json, "\"UNVERIFIED\"");
    }
}
