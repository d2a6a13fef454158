// Copyright (c) 2025 - Cowboy AI, Inc.

//! OAuth 2.1 / MCP Authorization Core
//!
//! Implements authorization-code + PKCE, the device-authorization grant
//! with mobile-approved enrollment, and refresh-token rotation. Endpoints
//! here are service methods with typed responses and tagged errors; the
//! HTTP surface that mounts them is an external collaborator.
//!
//! # Modules
//!
//! - [`device`] - device-flow state machine with Ed25519-verified approval
//! - [`token`] - RS256 access tokens, rotating refresh tokens, verification
//! - [`pkce`] - authorization codes bound to S256 challenges
//! - [`registration`] - mobile enrollment with out-of-band verification
//! - [`keys`] - signing keys and JWKS
//! - [`discovery`] - OIDC-shaped discovery document
//! - [`error`] - tagged OAuth error values

pub mod device;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod pkce;
pub mod registration;
pub mod token;

pub use device::{DeviceAuthService, DeviceCodeResponse};
pub use discovery::DiscoveryDocument;
pub use error::{AuthError, AuthResult, OAuthErrorBody};
pub use keys::JwtKeyManager;
pub use pkce::{AuthCodeService, AuthorizeRequest};
pub use registration::{
    DeviceInfo, EmailSender, LoggingEmailSender, MobileRegistrationService, RegistrationResponse,
    VerifiedRegistration,
};
pub use token::{TokenGrant, TokenService, TokenSubject, VerifiedToken};

use std::collections::HashMap;
use std::sync::Arc;

/// Grant dispatch for the token endpoint.
///
/// `POST /oauth/token` parameters arrive as a form map; the grant type
/// selects the flow and tagged [`AuthError`] values tell the transport
/// layer which OAuth error object and status to produce.
pub struct AuthCore {
    pub tokens: Arc<TokenService>,
    pub device: Arc<DeviceAuthService>,
    pub codes: Arc<AuthCodeService>,
}

impl AuthCore {
    pub fn new(
        tokens: Arc<TokenService>,
        device: Arc<DeviceAuthService>,
        codes: Arc<AuthCodeService>,
    ) -> Self {
        Self {
            tokens,
            device,
            codes,
        }
    }

    /// Handle a token request for any supported grant type
    pub async fn token_endpoint(
        &self,
        grant_type: &str,
        params: &HashMap<String, String>,
    ) -> AuthResult<TokenGrant> {
        let get = |key: &str| -> AuthResult<&str> {
            params
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| AuthError::InvalidRequest(format!("missing {key}")))
        };
        // RFC 8707 resource parameter: recorded as `aud`, not enforced
        let audience = params.get("resource").cloned();

        match grant_type {
            "authorization_code" => {
                let redeemed = self
                    .codes
                    .exchange(
                        get("code")?,
                        get("client_id")?,
                        get("redirect_uri")?,
                        get("code_verifier")?,
                    )
                    .await?;

                let subject = TokenSubject {
                    sub: redeemed.user_id,
                    tenant: None,
                    device_id: None,
                    client_id: redeemed.client_id,
                    scope: redeemed.scope,
                    audience,
                    email: None,
                };
                self.tokens.issue(&subject).await
            }
            "refresh_token" => {
                self.tokens
                    .refresh(get("refresh_token")?, get("client_id")?)
                    .await
            }
            "urn:ietf:params:oauth:grant-type:device_code" => {
                self.device
                    .poll(get("device_code")?, get("client_id")?)
                    .await
            }
            other => Err(AuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}
