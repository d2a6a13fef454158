// Copyright (c) 2025 - Cowboy AI, Inc.
//! Storage Source Watcher Service
//!
//! Emits normalized file-change events from the object store onto the main
//! storage-events subject.
//!
//! Run with: cargo run --bin source-watcher
//!
//! The polling strategy walks the filer over HTTP on a fixed interval
//! (P8FS_POLL_INTERVAL_SECS). The streaming strategy consumes the store's
//! metadata change feed; embedders supply the feed transport through
//! [`p8fs_core::watcher::MetadataFeed`], so this binary runs polling.

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use p8fs_core::watcher::{EventPublisher, PollingWatcher};
use p8fs_core::{NatsClient, ObjectStoreClient, PlatformConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting Storage Source Watcher (polling strategy)");

    let config = PlatformConfig::from_env("p8fs-source-watcher");
    info!("📋 Configuration loaded:");
    info!("  - NATS URL: {}", config.nats_url);
    info!("  - Filer URL: {}", config.object_store_url);
    info!("  - Poll interval: {:?}", config.poll_interval);

    let client = NatsClient::new(config.nats_config())
        .await
        .context("Failed to connect to NATS")?;
    let object_store = ObjectStoreClient::new(config.object_store_config())
        .context("Failed to build object store client")?;

    let publisher = EventPublisher::setup(client)
        .await
        .context("Failed to provision the storage events stream")?;
    info!("✅ Watcher setup complete");

    let shutdown = shutdown_signal();
    let mut watcher = PollingWatcher::new(
        std::sync::Arc::new(object_store),
        publisher,
        config.poll_interval,
        shutdown,
    );

    if let Err(e) = watcher.run().await {
        error!("Watcher failed: {e}");
        return Err(e.into());
    }

    info!("Watcher stopped");
    Ok(())
}

fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("Shutdown signal received, draining...");
        let _ = tx.send(true);
    });
    rx
}
