// Copyright (c) 2025 - Cowboy AI, Inc.

//! Streaming watcher over the object store's metadata change feed
//!
//! The feed itself is an external collaborator (the object store exposes it
//! over its own protocol); the watcher consumes it through [`MetadataFeed`]
//! and owns the reconnect policy: exponential backoff capped at 5 seconds,
//! restarting from "now" with no replay.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::errors::PlatformResult;
use crate::events::StoragePathInfo;

use super::{normalize_path, EventPublisher};

/// A raw metadata change from the object store
#[derive(Debug, Clone)]
pub struct MetadataChange {
    /// create / update / delete / rename, as reported by the feed
    pub event_type: String,
    pub path: String,
    pub is_directory: bool,
    pub file_size: u64,
    pub mime_type: Option<String>,
    /// Feed timestamp in nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
}

/// The object store's metadata change feed
///
/// Implementations hold the transport (gRPC, HTTP long-poll, ...); the
/// watcher only requires a stream of changes starting from "now".
#[async_trait]
pub trait MetadataFeed: Send + Sync {
    /// Open a change stream for paths under the given prefix
    async fn subscribe(
        &self,
        path_prefix: &str,
    ) -> PlatformResult<BoxStream<'static, PlatformResult<MetadataChange>>>;
}

/// Streaming source watcher (preferred strategy)
pub struct StreamWatcher<F: MetadataFeed> {
    feed: F,
    publisher: EventPublisher,
    path_prefix: String,
    shutdown: watch::Receiver<bool>,
}

impl<F: MetadataFeed> StreamWatcher<F> {
    /// Reconnect backoff cap
    const MAX_BACKOFF: Duration = Duration::from_secs(5);

    pub fn new(feed: F, publisher: EventPublisher, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            feed,
            publisher,
            path_prefix: "/buckets/".to_string(),
            shutdown,
        }
    }

    /// Run until shutdown, reconnecting on feed failures
    pub async fn run(&mut self) -> PlatformResult<()> {
        info!("Starting streaming source watcher on {}", self.path_prefix);
        let mut backoff = Duration::from_millis(500);
        let mut shutdown = self.shutdown.clone();

        while !*shutdown.borrow() {
            match self.feed.subscribe(&self.path_prefix).await {
                Ok(mut changes) => {
                    info!("Metadata feed connected");
                    backoff = Duration::from_millis(500);

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    info!("Streaming watcher draining");
                                    return Ok(());
                                }
                            }
                            change = changes.next() => match change {
                                Some(Ok(change)) => {
                                    if let Err(e) = self.handle_change(change).await {
                                        // One bad change must not stop the stream
                                        error!("Error processing metadata change: {e}");
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!("Metadata feed error: {e}");
                                    break;
                                }
                                None => {
                                    warn!("Metadata feed ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Metadata feed unavailable: {e}");
                }
            }

            if *shutdown.borrow() {
                break;
            }
            debug!("Reconnecting metadata feed in {:?}", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Self::MAX_BACKOFF);
        }

        info!("Streaming watcher stopped");
        Ok(())
    }

    async fn handle_change(&self, change: MetadataChange) -> PlatformResult<()> {
        // Directory events and multipart temporaries never leave the source
        if change.is_directory {
            debug!("Skipping directory change: {}", change.path);
            return Ok(());
        }
        if change.path.contains("uploadId=") {
            debug!("Skipping multipart temporary: {}", change.path);
            return Ok(());
        }

        let path = normalize_path(&change.path);
        let info = StoragePathInfo::from_full_path(&path);
        let Some(tenant_id) = info.tenant_id else {
            debug!("Skipping non-tenant path: {path}");
            return Ok(());
        };

        let event = json!({
            "type": change.event_type,
            "path": path,
            "timestamp": change.timestamp_ns as f64 / 1e9,
            "timestamp_ns": change.timestamp_ns,
            "source": "metadata-feed",
            "tenant_id": tenant_id,
            "size": change.file_size,
            "mime_type": change.mime_type,
            "is_directory": false,
            "captured_at": Utc::now().to_rfc3339(),
        });

        self.publisher.publish(&event).await
    }
}
