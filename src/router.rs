// Copyright (c) 2025 - Cowboy AI, Inc.

//! Tiered storage event router
//!
//! Consumes the main storage-events subject and publishes each qualifying
//! event to exactly one tier subject, chosen by file size.
//!
//! # Resilience patterns
//!
//! The router deliberately trades throughput for predictability:
//!
//! 1. **Explicit consumer cleanup.** Stale consumers from crashed
//!    predecessors are deleted before the shared consumer is ensured; a
//!    leftover consumer can stall redelivery indefinitely.
//! 2. **Fail-hard setup.** Any setup failure terminates the process rather
//!    than limping along degraded.
//! 3. **Consecutive-error accounting.** Timeouts reset the counter;
//!    processing errors increment it. Three consecutive errors end the
//!    process with exponential backoff between attempts.
//! 4. **Publish-then-ack.** A message is acknowledged only after its tier
//!    publish persisted, so failed routing is redelivered.
//! 5. **Single-message batches.** One message per fetch keeps the failure
//!    blast radius to one event.

use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::errors::{PlatformError, PlatformResult};
use crate::events::{extract_file_size, RoutingInfo};
use crate::nats::{self, ConsumerOptions, NatsClient, PullSubscription};
use crate::subjects::{
    RouterConfig, Tier, LEGACY_ROUTER_CONSUMERS, ROUTER_CONSUMER, STORAGE_EVENTS_STREAM,
    STORAGE_EVENTS_SUBJECT,
};

/// Minimum file size assumed when an event carries none; routes to small.
const DEFAULT_SIZE_FLOOR: u64 = 1024;

/// File size used for routing: the extraction fallback chain with the
/// default floor applied.
pub fn routed_file_size(raw: &Value) -> u64 {
    extract_file_size(raw).max(DEFAULT_SIZE_FLOOR)
}

/// Enrich an event with routing metadata and choose its target subject.
///
/// Returns the enriched event and the tier subject it belongs on.
pub fn enrich_for_routing(
    mut event: Value,
    router_id: &str,
    message_count: u64,
) -> (Value, String) {
    let file_size = routed_file_size(&event);
    let tier = Tier::for_size(file_size);
    let target_subject = tier.subject();

    let routing = RoutingInfo {
        original_subject: STORAGE_EVENTS_SUBJECT.to_string(),
        target_subject: target_subject.clone(),
        file_size_bytes: file_size,
        router_id: router_id.to_string(),
        message_count,
        routing_timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
    };

    if let Value::Object(map) = &mut event {
        map.insert(
            "routing".to_string(),
            serde_json::to_value(routing).expect("routing info serializes"),
        );
    }

    (event, target_subject)
}

/// Routes storage events to size-appropriate worker queues
pub struct TieredStorageRouter {
    client: NatsClient,
    /// Instance identity for logs and routing metadata only; all instances
    /// share the [`ROUTER_CONSUMER`] durable name.
    instance_id: String,
    config: RouterConfig,
    subscription: Option<PullSubscription>,
    processed_count: u64,
    error_count: u64,
    shutdown: watch::Receiver<bool>,
}

impl TieredStorageRouter {
    pub fn new(
        client: NatsClient,
        instance_id: Option<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let instance_id = instance_id
            .unwrap_or_else(|| format!("router-{}", Utc::now().timestamp()));
        Self {
            client,
            instance_id,
            config: RouterConfig::default(),
            subscription: None,
            processed_count: 0,
            error_count: 0,
            shutdown,
        }
    }

    /// Strict fail-hard startup sequence.
    ///
    /// Every step must succeed or the caller exits non-zero.
    pub async fn setup(&mut self) -> PlatformResult<()> {
        info!("Setting up tiered storage router...");

        // Step 1: JetStream must be available
        self.client.verify_jetstream().await?;

        // Step 2: main + tier streams with their subject bindings
        self.client
            .ensure_stream(
                STORAGE_EVENTS_STREAM,
                vec![STORAGE_EVENTS_SUBJECT.to_string()],
            )
            .await?;
        for tier in Tier::ALL {
            self.client
                .ensure_stream(&tier.stream(), vec![tier.subject()])
                .await?;
        }

        // Step 3: tier worker consumers
        for tier in Tier::ALL {
            let worker = tier.worker_config();
            self.client
                .ensure_consumer(
                    &tier.stream(),
                    tier.consumer(),
                    ConsumerOptions {
                        max_deliver: worker.max_deliver,
                        ack_wait: worker.processing_timeout,
                        max_ack_pending: worker.max_ack_pending,
                        filter_subject: None,
                    },
                )
                .await?;
        }

        // Step 4: delete legacy/rogue consumers on the main stream.
        // The shared consumer name is never deleted; other instances use it.
        info!("Cleaning up old consumers...");
        for name in LEGACY_ROUTER_CONSUMERS {
            match self.client.delete_consumer(STORAGE_EVENTS_STREAM, name).await {
                Ok(true) => debug!("Deleted old consumer: {name}"),
                Ok(false) => debug!("Consumer {name} didn't exist"),
                Err(e) => return Err(e),
            }
        }

        // Step 5: shared router consumer (idempotent)
        self.client
            .ensure_consumer(
                STORAGE_EVENTS_STREAM,
                ROUTER_CONSUMER,
                ConsumerOptions {
                    max_deliver: self.config.max_deliver,
                    ack_wait: self.config.ack_wait,
                    max_ack_pending: 1000,
                    filter_subject: None,
                },
            )
            .await?;

        // Step 6: pull subscription
        let subscription = self
            .client
            .pull_subscribe(STORAGE_EVENTS_STREAM, ROUTER_CONSUMER)
            .await?;
        self.subscription = Some(subscription);

        info!(
            "Router instance {} connected to shared consumer {}",
            self.instance_id, ROUTER_CONSUMER
        );
        Ok(())
    }

    /// Main processing loop.
    ///
    /// Runs until shutdown (draining by completing the current cycle) or
    /// until [`RouterConfig::max_consecutive_errors`] is reached, which
    /// returns an error so the process exits non-zero.
    pub async fn run(&mut self) -> PlatformResult<()> {
        let subscription = self
            .subscription
            .take()
            .ok_or_else(|| PlatformError::Configuration("router not set up".into()))?;

        info!("Starting message processing loop...");
        let mut consecutive_errors: u32 = 0;

        while !*self.shutdown.borrow() {
            let outcome = async {
                let messages = subscription
                    .fetch(1, self.config.fetch_timeout)
                    .await?;

                for message in messages {
                    self.process_single_message(&message).await?;
                }
                Ok::<(), PlatformError>(())
            }
            .await;

            match outcome {
                Ok(()) => {
                    // Timeouts surface as empty batches and land here too
                    consecutive_errors = 0;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.error_count += 1;
                    error!(
                        "Error in processing loop (consecutive: {consecutive_errors}): {e}"
                    );

                    let backoff = Duration::from_secs(2 * consecutive_errors as u64);
                    info!("Backing off for {:?}...", backoff);
                    tokio::time::sleep(backoff).await;

                    if consecutive_errors >= self.config.max_consecutive_errors {
                        error!(
                            "Too many consecutive errors ({consecutive_errors}) - failing hard"
                        );
                        return Err(PlatformError::Generic(format!(
                            "router failed after {consecutive_errors} consecutive errors"
                        )));
                    }
                }
            }
        }

        info!(
            "Message processing stopped. Processed {} messages, {} errors",
            self.processed_count, self.error_count
        );
        Ok(())
    }

    /// Route one message: parse, enrich, publish, then ack.
    async fn process_single_message(
        &mut self,
        message: &async_nats::jetstream::Message,
    ) -> PlatformResult<()> {
        let event: Value = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                // Bad payloads are acked and dropped; redelivery cannot fix them
                warn!("Invalid JSON in message #{}: {e}", self.processed_count);
                nats::ack(message).await?;
                return Ok(());
            }
        };

        let (enriched, target_subject) =
            enrich_for_routing(event, &self.instance_id, self.processed_count);
        let file_size = routed_file_size(&enriched);

        debug!(
            "Routing message #{}: {file_size} bytes → {target_subject}",
            self.processed_count
        );

        // Publish must persist before the ack; a failed publish leaves the
        // message unacked for redelivery.
        self.client
            .publish_json(&target_subject, &enriched)
            .await?;
        nats::ack(message).await?;

        self.processed_count += 1;
        if self.processed_count % 100 == 0 {
            info!("Processed {} messages", self.processed_count);
        }
        info!(
            "Routed message #{} ({file_size} bytes) to {target_subject}",
            self.processed_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_small_file_gets_default_floor() {
        // Scenario: 100-byte create event routes small with the floor applied
        let event = json!({
            "event_type": "create",
            "path": "/buckets/t1/uploads/a.txt",
            "size": 100
        });
        let (enriched, subject) = enrich_for_routing(event, "router-test", 0);
        assert_eq!(subject, "p8fs.storage.events.small");
        assert_eq!(enriched["routing"]["file_size_bytes"], 1024);
        assert_eq!(enriched["routing"]["target_subject"], "p8fs.storage.events.small");
        assert_eq!(enriched["routing"]["router_id"], "router-test");
    }

    #[test]
    fn test_medium_file_routing() {
        let size: u64 = 200 * 1024 * 1024;
        let event = json!({"event_type": "create", "path": "/buckets/t1/u/b.bin", "size": size});
        let (enriched, subject) = enrich_for_routing(event, "r", 1);
        assert_eq!(subject, "p8fs.storage.events.medium");
        assert_eq!(enriched["routing"]["file_size_bytes"], 209_715_200u64);
    }

    #[test]
    fn test_large_file_routing() {
        let size: u64 = 2 * 1024 * 1024 * 1024;
        let event = json!({"size": size});
        let (_, subject) = enrich_for_routing(event, "r", 2);
        assert_eq!(subject, "p8fs.storage.events.large");
    }

    #[test]
    fn test_boundary_sizes() {
        let (_, subject) = enrich_for_routing(json!({"size": Tier::SMALL_MAX}), "r", 0);
        assert_eq!(subject, "p8fs.storage.events.small");
        let (_, subject) = enrich_for_routing(json!({"size": Tier::SMALL_MAX + 1}), "r", 0);
        assert_eq!(subject, "p8fs.storage.events.medium");
        let (_, subject) = enrich_for_routing(json!({"size": Tier::MEDIUM_MAX + 1}), "r", 0);
        assert_eq!(subject, "p8fs.storage.events.large");
    }

    #[test]
    fn test_routing_preserves_original_fields() {
        let event = json!({
            "event_type": "update",
            "path": "/buckets/t1/u/c.txt",
            "size": 5,
            "custom_field": "survives"
        });
        let (enriched, _) = enrich_for_routing(event, "r", 7);
        assert_eq!(enriched["custom_field"], "survives");
        assert_eq!(enriched["path"], "/buckets/t1/u/c.txt");
        assert_eq!(enriched["routing"]["message_count"], 7);
        assert_eq!(
            enriched["routing"]["original_subject"],
            "p8fs.storage.events"
        );
    }

    #[test]
    fn test_size_fallback_chain_in_routing() {
        let event = json!({"entry": {"attributes": {"file_size": 5_000_000}}});
        assert_eq!(routed_file_size(&event), 5_000_000);
        // No size anywhere: floored to 1 KiB
        assert_eq!(routed_file_size(&json!({})), 1024);
    }
}
