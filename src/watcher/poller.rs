// Copyright (c) 2025 - Cowboy AI, Inc.

//! Polling watcher (fallback strategy)
//!
//! Walks `/buckets/` on a fixed interval and diffs an in-memory
//! path → content-hash map to synthesize CREATE/UPDATE/DELETE events. The
//! first pass is silent: it only populates the map, so a restart does not
//! replay the whole bucket as creates.

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::errors::PlatformResult;
use crate::object_store::{DirEntry, ObjectPath, ObjectStore};

use super::{extract_tenant_id, normalize_path, EventPublisher};

/// Fixed-interval polling source watcher
pub struct PollingWatcher {
    object_store: std::sync::Arc<dyn ObjectStore>,
    publisher: EventPublisher,
    poll_interval: Duration,
    path_prefix: String,
    /// path → content hash from the previous pass
    file_hashes: HashMap<String, String>,
    shutdown: watch::Receiver<bool>,
}

impl PollingWatcher {
    pub fn new(
        object_store: std::sync::Arc<dyn ObjectStore>,
        publisher: EventPublisher,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            object_store,
            publisher,
            poll_interval,
            path_prefix: "/buckets/".to_string(),
            file_hashes: HashMap::new(),
            shutdown,
        }
    }

    /// Run until shutdown
    pub async fn run(&mut self) -> PlatformResult<()> {
        info!(
            "Starting polling watcher with {:?} interval",
            self.poll_interval
        );

        // Silent first pass: populate the hash map only
        let prefix = self.path_prefix.clone();
        if let Err(e) = self.scan_directory(&prefix, true).await {
            error!("Initial scan failed: {e}");
        }

        while !*self.shutdown.borrow() {
            if let Err(e) = self.scan_directory(&prefix, false).await {
                error!("Error during polling scan: {e}");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!("Polling watcher stopped");
        Ok(())
    }

    /// Recursively scan a directory, emitting events on diffs
    async fn scan_directory(&mut self, path: &str, initial: bool) -> PlatformResult<()> {
        let entries = self.object_store.list(path).await?;
        let mut current_files = HashSet::new();

        for entry in entries {
            let full_path = normalize_path(&entry.full_path);
            if full_path.is_empty() || full_path == path {
                continue;
            }

            if entry.is_directory() {
                Box::pin(self.scan_directory(&full_path, initial)).await?;
            } else {
                current_files.insert(full_path.clone());
                if initial {
                    if let Some(hash) = self.file_hash(&full_path).await {
                        self.file_hashes.insert(full_path, hash);
                    }
                } else {
                    self.check_file(&full_path, &entry).await;
                }
            }
        }

        // Deleted files: tracked directly under this path, no longer listed
        if !initial {
            let removed: Vec<String> = self
                .file_hashes
                .keys()
                .filter(|tracked| {
                    let Some(rest) = tracked.strip_prefix(path) else {
                        return false;
                    };
                    !rest.trim_start_matches('/').contains('/')
                        && !current_files.contains(*tracked)
                })
                .cloned()
                .collect();

            for path in removed {
                self.emit("delete", &path, None).await;
                self.file_hashes.remove(&path);
            }
        }

        Ok(())
    }

    async fn check_file(&mut self, path: &str, entry: &DirEntry) {
        let Some(current) = self.file_hash(path).await else {
            return;
        };

        match self.file_hashes.get(path) {
            None => {
                self.emit("create", path, Some(entry)).await;
                self.file_hashes.insert(path.to_string(), current);
            }
            Some(previous) if previous != &current => {
                self.emit("update", path, Some(entry)).await;
                self.file_hashes.insert(path.to_string(), current);
            }
            Some(_) => {}
        }
    }

    /// Content hash used for change detection; None when unreadable
    async fn file_hash(&self, path: &str) -> Option<String> {
        let object_path = ObjectPath::parse(path).ok()?;
        let tenant = object_path.tenant_id().to_string();
        match self.object_store.download(&object_path, &tenant).await {
            Ok(object) => {
                let digest = Sha256::digest(&object.content);
                Some(format!("{digest:x}"))
            }
            Err(e) => {
                debug!("Could not hash {path}: {e}");
                None
            }
        }
    }

    async fn emit(&self, event_type: &str, path: &str, entry: Option<&DirEntry>) {
        let Some(tenant_id) = extract_tenant_id(path) else {
            debug!("Skipping non-tenant path: {path}");
            return;
        };

        let mut event = json!({
            "type": event_type,
            "path": path,
            "timestamp": Utc::now().timestamp() as f64,
            "source": "http-poller",
            "tenant_id": tenant_id,
        });

        if let Some(entry) = entry {
            event["size"] = json!(entry.file_size);
            if let Some(mime) = &entry.mime {
                event["mime_type"] = json!(mime);
            }
            if let Some(mtime) = &entry.mtime {
                event["last_modified"] = json!(mtime);
            }
        }

        if let Err(e) = self.publisher.publish(&event).await {
            error!("Failed to publish {event_type} event for {path}: {e}");
        } else {
            info!("Generated {event_type} event for {path}");
        }
    }
}
