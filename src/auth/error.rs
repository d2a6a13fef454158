// Copyright (c) 2025 - Cowboy AI, Inc.

//! OAuth error taxonomy
//!
//! Auth failures are tagged values the transport layer inspects to set the
//! HTTP status and the RFC 6749 error body; control flow never relies on
//! string matching. Internal details are never leaked to clients.

use serde::Serialize;
use thiserror::Error;

/// OAuth 2.0 error response body per RFC 6749 Section 5.2
#[derive(Debug, Serialize)]
pub struct OAuthErrorBody {
    pub error: &'static str,
    pub error_description: String,
}

/// Authorization core errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing required parameters
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Expired, consumed, or unknown grant
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Device flow: user has not approved yet
    #[error("authorization_pending")]
    AuthorizationPending,

    /// Device flow: the device code's lifetime ran out
    #[error("expired_token")]
    ExpiredToken,

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    /// Unknown client
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Ed25519 approval signature did not verify
    #[error("invalid device signature")]
    SignatureInvalid,

    /// Bearer token past its `exp`
    #[error("token expired")]
    TokenExpired,

    /// Missing or invalid bearer credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal failure; detail stays server-side
    #[error("server_error")]
    Internal(String),
}

impl AuthError {
    /// RFC error code for the response body
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::AuthorizationPending => "authorization_pending",
            AuthError::ExpiredToken => "expired_token",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::SignatureInvalid => "invalid_grant",
            AuthError::TokenExpired => "invalid_token",
            AuthError::Unauthorized(_) => "invalid_token",
            AuthError::Internal(_) => "server_error",
        }
    }

    /// HTTP status hint for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidRequest(_)
            | AuthError::InvalidGrant(_)
            | AuthError::AuthorizationPending
            | AuthError::ExpiredToken
            | AuthError::UnsupportedGrantType(_)
            | AuthError::UnsupportedResponseType(_) => 400,
            AuthError::InvalidClient(_)
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired
            | AuthError::Unauthorized(_) => 401,
            AuthError::Internal(_) => 500,
        }
    }

    /// `WWW-Authenticate` header value, when the status is 401
    pub fn www_authenticate(&self) -> Option<&'static str> {
        (self.status_code() == 401).then_some("Bearer")
    }

    /// Error body with internal details scrubbed
    pub fn body(&self) -> OAuthErrorBody {
        let description = match self {
            // Never leak internals to clients
            AuthError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        OAuthErrorBody {
            error: self.error_code(),
            error_description: description,
        }
    }
}

impl From<crate::errors::PlatformError> for AuthError {
    fn from(err: crate::errors::PlatformError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Result type for authorization operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::AuthorizationPending.status_code(), 400);
        assert_eq!(AuthError::InvalidClient("x".into()).status_code(), 401);
        assert_eq!(AuthError::SignatureInvalid.status_code(), 401);
        assert_eq!(AuthError::TokenExpired.status_code(), 401);
        assert_eq!(AuthError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_expired_bearer_carries_www_authenticate() {
        assert_eq!(AuthError::TokenExpired.www_authenticate(), Some("Bearer"));
        assert_eq!(AuthError::InvalidGrant("x".into()).www_authenticate(), None);
    }

    #[test]
    fn test_internal_detail_is_scrubbed() {
        let body = AuthError::Internal("stack trace with secrets".into()).body();
        assert_eq!(body.error, "server_error");
        assert!(!body.error_description.contains("secrets"));
    }
}
