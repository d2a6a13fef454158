// Copyright (c) 2025 - Cowboy AI, Inc.

//! Environment-driven configuration
//!
//! Every binary loads its configuration from the environment with local
//! defaults, so a bare `cargo run` talks to a local stack.

use std::time::Duration;

use crate::nats::NatsConfig;
use crate::object_store::ObjectStoreConfig;

/// Platform configuration shared by the binaries
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// NATS server URL
    pub nats_url: String,

    /// Client name reported to NATS
    pub client_name: String,

    /// Object store (filer) base URL
    pub object_store_url: String,

    /// Base URL for device verification pages and discovery
    pub verification_base_url: String,

    /// Polling watcher interval
    pub poll_interval: Duration,
}

impl PlatformConfig {
    /// Load configuration from environment variables
    pub fn from_env(client_name: &str) -> Self {
        let nats_url =
            std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
        let object_store_url = std::env::var("P8FS_FILER_URL")
            .unwrap_or_else(|_| "http://localhost:8888".to_string());
        let verification_base_url = std::env::var("P8FS_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let poll_interval = std::env::var("P8FS_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Self {
            nats_url,
            client_name: client_name.to_string(),
            object_store_url,
            verification_base_url,
            poll_interval,
        }
    }

    pub fn nats_config(&self) -> NatsConfig {
        NatsConfig {
            servers: vec![self.nats_url.clone()],
            name: self.client_name.clone(),
            ..NatsConfig::default()
        }
    }

    pub fn object_store_config(&self) -> ObjectStoreConfig {
        ObjectStoreConfig {
            base_url: self.object_store_url.clone(),
            ..ObjectStoreConfig::default()
        }
    }
}
