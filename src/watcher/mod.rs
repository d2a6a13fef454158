// Copyright (c) 2025 - Cowboy AI, Inc.

//! Storage source watcher
//!
//! Emits normalized file-change events from the object store onto the main
//! storage-events subject. Two interchangeable strategies; exactly one runs
//! per deployment:
//!
//! - [`stream::StreamWatcher`] - long-lived metadata change feed (preferred)
//! - [`poller::PollingWatcher`] - fixed-interval directory walk (fallback)
//!
//! Both strategies drop directory events and multipart-upload temporaries at
//! the source and publish only tenant-scoped paths.

pub mod poller;
pub mod stream;

pub use poller::PollingWatcher;
pub use stream::{MetadataChange, MetadataFeed, StreamWatcher};

use serde_json::Value;
use tracing::debug;

use crate::errors::PlatformResult;
use crate::events::StoragePathInfo;
use crate::nats::NatsClient;
use crate::subjects::{STORAGE_EVENTS_STREAM, STORAGE_EVENTS_SUBJECT};

/// Publishes watcher events onto the main subject
///
/// Setup ensures the main stream exists before the first publish; a watcher
/// that cannot provision its stream fails hard.
#[derive(Clone)]
pub struct EventPublisher {
    nats: NatsClient,
}

impl EventPublisher {
    pub async fn setup(nats: NatsClient) -> PlatformResult<Self> {
        nats.ensure_stream(
            STORAGE_EVENTS_STREAM,
            vec![STORAGE_EVENTS_SUBJECT.to_string()],
        )
        .await?;
        Ok(Self { nats })
    }

    /// Publish a raw storage event onto the main subject
    pub async fn publish(&self, event: &Value) -> PlatformResult<()> {
        self.nats.publish_json(STORAGE_EVENTS_SUBJECT, event).await?;
        debug!(
            "Published {} event for {}",
            event.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            event.get("path").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
        );
        Ok(())
    }
}

/// Normalize a path to always start with `/`
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Tenant id for a path, None when the path is not tenant-scoped
pub(crate) fn extract_tenant_id(path: &str) -> Option<String> {
    StoragePathInfo::from_full_path(path).tenant_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("buckets/t1/a/b"), "/buckets/t1/a/b");
        assert_eq!(normalize_path("/buckets/t1/a/b"), "/buckets/t1/a/b");
    }

    #[test]
    fn test_extract_tenant_id() {
        assert_eq!(
            extract_tenant_id("/buckets/t1/uploads/a.txt").as_deref(),
            Some("t1")
        );
        assert_eq!(extract_tenant_id("/topics/system/x"), None);
    }
}
