// Copyright (c) 2025 - Cowboy AI, Inc.

//! OIDC-shaped discovery document

use serde::Serialize;

/// Discovery document for `/.well-known/openid-configuration`
///
/// The base URL is derived from the request host by the transport layer and
/// passed in here.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub device_authorization_endpoint: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub scopes_supported: Vec<&'static str>,
}

impl DiscoveryDocument {
    pub fn for_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}/oauth/authorize"),
            token_endpoint: format!("{base}/oauth/token"),
            device_authorization_endpoint: format!("{base}/oauth/device_authorization"),
            revocation_endpoint: format!("{base}/oauth/revoke"),
            introspection_endpoint: format!("{base}/oauth/introspect"),
            jwks_uri: format!("{base}/.well-known/jwks.json"),
            response_types_supported: vec!["code"],
            grant_types_supported: vec![
                "authorization_code",
                "refresh_token",
                "urn:ietf:params:oauth:grant-type:device_code",
            ],
            code_challenge_methods_supported: vec!["S256"],
            token_endpoint_auth_methods_supported: vec!["none", "client_secret_post"],
            scopes_supported: vec!["read", "write"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_shape() {
        let doc = DiscoveryDocument::for_base_url("https://api.example.com/");
        assert_eq!(doc.issuer, "https://api.example.com");
        assert_eq!(doc.token_endpoint, "https://api.example.com/oauth/token");
        assert_eq!(doc.response_types_supported, vec!["code"]);
        assert!(doc
            .grant_types_supported
            .contains(&"urn:ietf:params:oauth:grant-type:device_code"));
        assert_eq!(doc.code_challenge_methods_supported, vec!["S256"]);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json["jwks_uri"],
            "https://api.example.com/.well-known/jwks.json"
        );
    }
}
