// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tiered Storage Router Service
//!
//! Consumes the main storage-events subject and fans events out to the
//! small/medium/large worker queues by file size.
//!
//! Run with: cargo run --bin tiered-router
//!
//! Prerequisites:
//! 1. NATS server with JetStream (default: localhost:4222, NATS_URL to override)
//!
//! Multiple instances share one durable consumer; NATS load-balances
//! messages between them. Any setup failure exits non-zero by design.

use anyhow::{Context, Result};
use p8fs_core::{NatsClient, PlatformConfig, TieredStorageRouter};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting Tiered Storage Router");

    let config = PlatformConfig::from_env("p8fs-tiered-router");
    info!("📋 Configuration loaded:");
    info!("  - NATS URL: {}", config.nats_url);

    let client = NatsClient::new(config.nats_config())
        .await
        .context("Failed to connect to NATS")?;

    let shutdown = shutdown_signal();
    let instance_id = std::env::var("P8FS_ROUTER_ID").ok();
    let mut router = TieredStorageRouter::new(client, instance_id, shutdown);

    router
        .setup()
        .await
        .context("Router setup failed - exiting")?;
    info!("✅ Router setup complete");

    if let Err(e) = router.run().await {
        error!("Router failed: {e}");
        return Err(e.into());
    }

    info!("Router drained and stopped");
    Ok(())
}

/// Resolves to a watch channel flipped on SIGTERM or ctrl-c
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
