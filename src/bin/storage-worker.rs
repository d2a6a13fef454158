// Copyright (c) 2025 - Cowboy AI, Inc.
//! Storage Worker Service
//!
//! Consumes one size tier's queue: downloads each file, parses and chunks
//! its content, generates embeddings, and persists the rows.
//!
//! Run with: cargo run --bin storage-worker -- small
//! (or set P8FS_WORKER_TIER=small|medium|large)
//!
//! Prerequisites:
//! 1. NATS server with JetStream (NATS_URL)
//! 2. Object store filer reachable (P8FS_FILER_URL)

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use p8fs_core::embeddings::EmbeddingRegistry;
use p8fs_core::models::register_models;
use p8fs_core::repository::{EntityStore, MemoryStore, TenantRepository};
use p8fs_core::worker::{
    DocumentProcessorRegistry, EngramProcessor, FileProcessor, ParserRegistry,
};
use p8fs_core::{NatsClient, ObjectStoreClient, PlatformConfig, StorageEventWorker, Tier};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let tier: Tier = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("P8FS_WORKER_TIER").ok())
        .unwrap_or_else(|| "small".to_string())
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let tenant_id = std::env::var("P8FS_TENANT_ID").unwrap_or_else(|_| "default".to_string());

    info!("🚀 Starting {} storage worker for tenant {}", tier, tenant_id);

    let config = PlatformConfig::from_env(&format!("p8fs-{tier}-worker"));
    info!("📋 Configuration loaded:");
    info!("  - NATS URL: {}", config.nats_url);
    info!("  - Filer URL: {}", config.object_store_url);

    let client = NatsClient::new(config.nats_config())
        .await
        .context("Failed to connect to NATS")?;
    let object_store = ObjectStoreClient::new(config.object_store_config())
        .context("Failed to build object store client")?;

    // Explicit registries, populated once at startup
    let _models = register_models();
    let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
    let embeddings = EmbeddingRegistry::with_local_default();
    let parsers = Arc::new(ParserRegistry::with_defaults());

    let resources = TenantRepository::new(store.clone(), embeddings.clone(), tenant_id.clone());
    let files = TenantRepository::new(store.clone(), embeddings.clone(), tenant_id.clone());

    let mut processors = DocumentProcessorRegistry::new();
    processors.register(Arc::new(EngramProcessor::new(resources.clone())));

    let processor = FileProcessor::new(
        Arc::new(object_store),
        files,
        resources,
        parsers,
        Arc::new(processors),
    );

    let shutdown = shutdown_signal();
    let mut worker = StorageEventWorker::new(tier, client, processor, shutdown);

    worker.setup().await.context("Worker setup failed")?;
    info!("✅ Worker setup complete");

    if let Err(e) = worker.run().await {
        error!("Worker failed: {e}");
        return Err(e.into());
    }

    info!(
        "Worker drained: {} processed, {} failed",
        worker.metrics.messages_processed, worker.metrics.messages_failed
    );
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
