// Copyright (c) 2025 - Cowboy AI, Inc.

//! Storage event workers
//!
//! One worker instance per tier, each consuming its tier's subject with the
//! tier's backpressure bounds. Workers are idempotent: processing the same
//! event twice lands on the same File/Resource/Embedding rows.
//!
//! A message is acknowledged only after the whole pipeline succeeded; any
//! failure naks it so the bus redelivers up to the tier's `max_deliver`.
//! Nak storms (three or more consecutive failures) back off exponentially,
//! capped at 30 seconds, before the next fetch.

pub mod engram;
pub mod parser;
pub mod pipeline;

pub use engram::{DocumentProcessor, DocumentProcessorRegistry, EngramProcessor, ProcessorResult};
pub use parser::{Chunk, Parser, ParserRegistry, TextParser};
pub use pipeline::FileProcessor;

use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::errors::{PlatformError, PlatformResult};
use crate::events::{StorageEvent, StorageEventType};
use crate::models::ids;
use crate::nats::{self, ConsumerOptions, NatsClient, PullSubscription};
use crate::subjects::Tier;

/// Fetch wait per pull; short so shutdown drains promptly
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff cap between fetches during a nak storm
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Worker performance counters
#[derive(Debug, Default, Clone)]
pub struct WorkerMetrics {
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub files_processed: u64,
    pub processing_time_total_ms: u64,
    pub last_activity: Option<f64>,
}

impl WorkerMetrics {
    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.messages_processed + self.messages_failed;
        if total == 0 {
            return 0.0;
        }
        self.messages_processed as f64 / total as f64 * 100.0
    }

    pub fn average_processing_time_ms(&self) -> f64 {
        if self.messages_processed == 0 {
            return 0.0;
        }
        self.processing_time_total_ms as f64 / self.messages_processed as f64
    }
}

/// Processes storage events from one tier's queue
pub struct StorageEventWorker {
    tier: Tier,
    client: NatsClient,
    processor: FileProcessor,
    subscription: Option<PullSubscription>,
    pub metrics: WorkerMetrics,
    shutdown: watch::Receiver<bool>,
}

impl StorageEventWorker {
    pub fn new(
        tier: Tier,
        client: NatsClient,
        processor: FileProcessor,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tier,
            client,
            processor,
            subscription: None,
            metrics: WorkerMetrics::default(),
            shutdown,
        }
    }

    /// Ensure the tier stream/consumer exist and bind the subscription
    pub async fn setup(&mut self) -> PlatformResult<()> {
        info!("Setting up {} storage worker", self.tier);
        let config = self.tier.worker_config();

        self.client
            .ensure_stream(&self.tier.stream(), vec![self.tier.subject()])
            .await?;

        self.client
            .ensure_consumer(
                &self.tier.stream(),
                self.tier.consumer(),
                ConsumerOptions {
                    max_deliver: config.max_deliver,
                    ack_wait: config.processing_timeout,
                    max_ack_pending: config.max_ack_pending,
                    filter_subject: None,
                },
            )
            .await?;

        let subscription = self
            .client
            .pull_subscribe(&self.tier.stream(), self.tier.consumer())
            .await?;
        self.subscription = Some(subscription);

        info!("Setup complete for {} worker", self.tier);
        Ok(())
    }

    /// Consume until shutdown, draining in-flight work first
    pub async fn run(&mut self) -> PlatformResult<()> {
        let subscription = self
            .subscription
            .take()
            .ok_or_else(|| PlatformError::Configuration("worker not set up".into()))?;

        let config = self.tier.worker_config();
        info!("Starting queue processing for {} queue", self.tier);

        let mut consecutive_failures: u32 = 0;

        while !*self.shutdown.borrow() {
            let messages = match subscription.fetch(config.batch_size, FETCH_TIMEOUT).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!("Error fetching from {} queue: {e}", self.tier);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if messages.is_empty() {
                debug!("No messages received from {} queue", self.tier);
                continue;
            }

            for message in messages {
                if *self.shutdown.borrow() {
                    // Drain: stop taking on new work; unacked messages redeliver
                    break;
                }

                let started = Utc::now();
                match self.process_single_message(&message).await {
                    Ok(()) => {
                        nats::ack(&message).await?;
                        consecutive_failures = 0;
                        self.metrics.messages_processed += 1;
                        self.metrics.processing_time_total_ms +=
                            (Utc::now() - started).num_milliseconds().max(0) as u64;
                        self.metrics.last_activity = Some(Utc::now().timestamp() as f64);
                    }
                    Err(e) => {
                        error!("Failed to process message in {} queue: {e}", self.tier);
                        let _ = nats::nak(&message).await;
                        self.metrics.messages_failed += 1;
                        consecutive_failures += 1;

                        if consecutive_failures >= 3 {
                            let backoff = Duration::from_secs(
                                2u64.saturating_pow(consecutive_failures.min(10)),
                            )
                            .min(MAX_BACKOFF);
                            warn!(
                                "{} consecutive failures on {} queue, backing off {:?}",
                                consecutive_failures, self.tier, backoff
                            );
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        }

        info!("Queue processing stopped for {}", self.tier);
        Ok(())
    }

    /// Decode, validate, and dispatch one message.
    ///
    /// Invalid payloads return Ok so the caller acks and drops them;
    /// processing failures bubble up for the caller to nak.
    async fn process_single_message(
        &mut self,
        message: &async_nats::jetstream::Message,
    ) -> PlatformResult<()> {
        let raw: Value = match serde_json::from_slice(&message.payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to parse message as JSON: {e}");
                return Ok(());
            }
        };

        let event = match StorageEvent::from_raw(&raw) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping invalid event: {e}");
                return Ok(());
            }
        };

        debug!(
            "Processing {} for {} ({} bytes)",
            event.event_type.as_str(),
            event.path,
            event.metadata.file_size
        );

        match event.event_type {
            StorageEventType::Create | StorageEventType::Update => {
                if !event.should_process() {
                    debug!("Event filtered out: {}", event.path);
                    return Ok(());
                }
                let budget = self.tier.worker_config().processing_timeout;
                match tokio::time::timeout(budget, self.processor.process_file(&event)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(PlatformError::Timeout(format!(
                            "{} exceeded {:?} budget",
                            event.path, budget
                        )));
                    }
                }
                self.metrics.files_processed += 1;
            }
            StorageEventType::Delete => {
                let file_id = ids::file_id(&event.tenant_id, &event.path);
                self.processor.delete_file(file_id).await?;
            }
            StorageEventType::Rename => {
                debug!("Ignoring rename event for {}", event.path);
            }
        }

        info!("Processed {}", event.path);
        Ok(())
    }
}
