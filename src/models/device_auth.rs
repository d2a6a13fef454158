// Copyright (c) 2025 - Cowboy AI, Inc.

//! Device authorization flow models
//!
//! A [`PendingDeviceRequest`] represents the temporary state between device
//! code issuance and approval:
//!
//! 1. Desktop requests a device code (creates the pending request)
//! 2. Mobile approves via QR/user code (sets APPROVED + tokens)
//! 3. Desktop polls and receives the tokens (transitions to CONSUMED)
//!
//! Requests live in KV storage with a TTL under two keys that expire
//! together: `device_auth:{device_code}` (authoritative) and
//! `user_code:{user_code}` (pointer).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status of a device authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceAuthStatus {
    Pending,
    Approved,
    Expired,
    /// Token retrieved; the request can never issue tokens again
    Consumed,
}

/// Temporary device authorization request stored in KV with TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDeviceRequest {
    /// Long opaque code the desktop polls with (≥128 random bits)
    pub device_code: String,

    /// Short human code for mobile entry, formatted `XXXX-YYYY`
    pub user_code: String,

    /// OAuth client requesting authorization
    pub client_id: String,

    #[serde(default)]
    pub scope: Vec<String>,

    pub status: DeviceAuthStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    // Approval data, set when the mobile user approves
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by_tenant: Option<String>,
    pub approved_device_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub approval_metadata: Map<String, Value>,
}

impl PendingDeviceRequest {
    /// Default request lifetime
    pub const TTL_SECONDS: i64 = 600;

    pub fn new_pending(
        device_code: String,
        user_code: String,
        client_id: String,
        scope: Vec<String>,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            device_code,
            user_code,
            client_id,
            scope,
            status: DeviceAuthStatus::Pending,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            approved_at: None,
            approved_by_tenant: None,
            approved_device_id: None,
            access_token: None,
            refresh_token: None,
            approval_metadata: Map::new(),
        }
    }

    /// Authoritative KV key
    pub fn storage_key(&self) -> String {
        format!("device_auth:{}", self.device_code)
    }

    /// Pointer KV key for mobile lookup
    pub fn user_code_key(&self) -> String {
        format!("user_code:{}", self.user_code)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_approved(&self) -> bool {
        self.status == DeviceAuthStatus::Approved && self.approved_at.is_some()
    }

    /// Mark approved by a tenant's device and attach the minted tokens
    pub fn approve(
        &mut self,
        tenant_id: &str,
        device_id: &str,
        access_token: String,
        refresh_token: String,
    ) {
        self.status = DeviceAuthStatus::Approved;
        self.approved_at = Some(Utc::now());
        self.approved_by_tenant = Some(tenant_id.to_string());
        self.approved_device_id = Some(device_id.to_string());
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
    }

    /// Whether a poll may retrieve tokens from this request
    pub fn can_be_consumed(&self) -> bool {
        self.is_approved() && self.access_token.is_some() && !self.is_expired()
    }

    /// Transition to CONSUMED and hand out the tokens.
    ///
    /// Non-reversible; a consumed request never issues tokens again.
    pub fn consume(&mut self) -> Option<(String, String)> {
        if !self.can_be_consumed() {
            return None;
        }
        self.status = DeviceAuthStatus::Consumed;
        match (self.access_token.clone(), self.refresh_token.clone()) {
            (Some(access), Some(refresh)) => Some((access, refresh)),
            (Some(access), None) => Some((access, String::new())),
            _ => None,
        }
    }
}

/// Normalize a user code for lookup: uppercase, and when the supplied code
/// is 8 characters with no hyphen, insert one after position 4.
pub fn normalize_user_code(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    if upper.len() == 8 && !upper.contains('-') {
        format!("{}-{}", &upper[..4], &upper[4..])
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingDeviceRequest {
        PendingDeviceRequest::new_pending(
            "device-code-opaque".into(),
            "ABCD-EFGH".into(),
            "client-1".into(),
            vec!["read".into(), "write".into()],
            600,
        )
    }

    #[test]
    fn test_storage_keys() {
        let request = pending();
        assert_eq!(request.storage_key(), "device_auth:device-code-opaque");
        assert_eq!(request.user_code_key(), "user_code:ABCD-EFGH");
    }

    #[test]
    fn test_consume_requires_approval() {
        let mut request = pending();
        assert!(request.consume().is_none());

        request.approve("tenant-x", "dev-1", "access".into(), "refresh".into());
        let (access, refresh) = request.consume().unwrap();
        assert_eq!(access, "access");
        assert_eq!(refresh, "refresh");
        assert_eq!(request.status, DeviceAuthStatus::Consumed);

        // Single consumption
        assert!(request.consume().is_none());
    }

    #[test]
    fn test_expired_request_cannot_be_consumed() {
        let mut request = pending();
        request.approve("tenant-x", "dev-1", "a".into(), "r".into());
        request.expires_at = Utc::now() - Duration::seconds(1);
        assert!(request.consume().is_none());
    }

    #[test]
    fn test_user_code_normalization() {
        assert_eq!(normalize_user_code("ABCDEFGH"), "ABCD-EFGH");
        assert_eq!(normalize_user_code("abcdefgh"), "ABCD-EFGH");
        assert_eq!(normalize_user_code("ABCD-EFGH"), "ABCD-EFGH");
        // Other lengths pass through unchanged
        assert_eq!(normalize_user_code("ABC"), "ABC");
    }
}
