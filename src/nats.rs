//! NATS client abstraction for the storage event bus
//!
//! Wraps `async_nats` with the capability set the router and workers need:
//! idempotent stream/consumer provisioning, durable pull subscriptions with
//! batched fetch, persisted publish, and explicit ack/nak.
//!
//! # Delivery guarantees
//!
//! Streams are provisioned with work-queue retention and consumers with
//! explicit acknowledgment. A published message is delivered at least once
//! to the stream's consumer; an ack must land within the consumer's
//! `ack_wait` or the bus redelivers, up to `max_deliver` attempts.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream, AckKind};
use async_nats::ConnectOptions;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::{PlatformError, PlatformResult};

/// Configuration for NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "p8fs-client".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Options for durable pull consumers
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Redeliveries before the bus gives up on a message
    pub max_deliver: i64,
    /// Time allowed between delivery and ack before redelivery
    pub ack_wait: Duration,
    /// Bound on in-flight unacknowledged messages
    pub max_ack_pending: i64,
    /// Optional subject filter within the stream
    pub filter_subject: Option<String>,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_deliver: 3,
            ack_wait: Duration::from_secs(60),
            max_ack_pending: 1000,
            filter_subject: None,
        }
    }
}

/// NATS client wrapper providing the storage event bus operations
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    /// Create a new NATS client with the given configuration
    pub async fn new(config: NatsConfig) -> PlatformResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());

        info!("Connected to NATS at {:?}", config.servers);

        Ok(Self { client, jetstream })
    }

    /// Verify JetStream is available on this connection.
    ///
    /// Setup sequences fail hard when the streaming extension is missing.
    pub async fn verify_jetstream(&self) -> PlatformResult<()> {
        self.jetstream
            .query_account()
            .await
            .map_err(|e| {
                PlatformError::NatsConnection(format!("JetStream not available: {e}"))
            })?;
        Ok(())
    }

    /// Create the stream if absent, or verify its subject binding if present.
    ///
    /// Streams are work queues: messages are deleted once acknowledged.
    pub async fn ensure_stream(
        &self,
        name: &str,
        subjects: Vec<String>,
    ) -> PlatformResult<Stream> {
        match self.jetstream.get_stream(name).await {
            Ok(mut stream) => {
                let info = stream
                    .info()
                    .await
                    .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;
                if info.config.subjects != subjects {
                    return Err(PlatformError::Configuration(format!(
                        "stream {name} bound to {:?}, expected {:?}",
                        info.config.subjects, subjects
                    )));
                }
                debug!("Stream {} already exists", name);
                Ok(stream)
            }
            Err(_) => {
                let stream = self
                    .jetstream
                    .create_stream(jetstream::stream::Config {
                        name: name.to_string(),
                        subjects,
                        retention: jetstream::stream::RetentionPolicy::WorkQueue,
                        storage: jetstream::stream::StorageType::File,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;
                info!("Created stream {}", name);
                Ok(stream)
            }
        }
    }

    /// Create a durable explicit-ack pull consumer if absent.
    ///
    /// Idempotent: an existing consumer with the same name is left as-is.
    pub async fn ensure_consumer(
        &self,
        stream_name: &str,
        consumer_name: &str,
        options: ConsumerOptions,
    ) -> PlatformResult<()> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;

        if stream
            .get_consumer::<jetstream::consumer::pull::Config>(consumer_name)
            .await
            .is_ok()
        {
            debug!("Consumer {} on {} already exists", consumer_name, stream_name);
            return Ok(());
        }

        stream
            .create_consumer(jetstream::consumer::pull::Config {
                durable_name: Some(consumer_name.to_string()),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                max_deliver: options.max_deliver,
                ack_wait: options.ack_wait,
                max_ack_pending: options.max_ack_pending,
                filter_subject: options.filter_subject.unwrap_or_default(),
                ..Default::default()
            })
            .await
            .map_err(|e| PlatformError::NatsConsumer(e.to_string()))?;

        info!("Created consumer {} on {}", consumer_name, stream_name);
        Ok(())
    }

    /// Delete a consumer from a stream.
    ///
    /// Returns Ok(false) when the consumer does not exist. Used to force
    /// cleanup of stale consumers at startup.
    pub async fn delete_consumer(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> PlatformResult<bool> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;

        match stream.delete_consumer(consumer_name).await {
            Ok(_) => {
                info!("Deleted consumer {} from {}", consumer_name, stream_name);
                Ok(true)
            }
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("not found") || msg.contains("does not exist") {
                    debug!("Consumer {} not present on {}", consumer_name, stream_name);
                    Ok(false)
                } else {
                    Err(PlatformError::NatsConsumer(e.to_string()))
                }
            }
        }
    }

    /// Bind a pull subscription to an existing durable consumer
    pub async fn pull_subscribe(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> PlatformResult<PullSubscription> {
        let stream = self
            .jetstream
            .get_stream(stream_name)
            .await
            .map_err(|e| PlatformError::NatsConnection(e.to_string()))?;

        let consumer: PullConsumer = stream
            .get_consumer(consumer_name)
            .await
            .map_err(|e| PlatformError::NatsConsumer(e.to_string()))?;

        Ok(PullSubscription { consumer })
    }

    /// Publish raw bytes, resolving only after JetStream has persisted them
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> PlatformResult<()> {
        self.jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| PlatformError::NatsPublish(e.to_string()))?
            .await
            .map_err(|e| PlatformError::NatsPublish(e.to_string()))?;

        debug!("Published message to subject: {}", subject);
        Ok(())
    }

    /// Publish a serializable value as JSON
    pub async fn publish_json<T>(&self, subject: &str, message: &T) -> PlatformResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;
        self.publish(subject, payload).await
    }

    /// Get the underlying NATS client for advanced operations
    pub fn inner(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }
}

/// A pull subscription bound to a durable consumer
pub struct PullSubscription {
    consumer: PullConsumer,
}

impl PullSubscription {
    /// Fetch up to `batch` messages, waiting at most `timeout`.
    ///
    /// A timeout yields an empty batch, never an error.
    pub async fn fetch(
        &self,
        batch: usize,
        timeout: Duration,
    ) -> PlatformResult<Vec<jetstream::Message>> {
        let mut collected = Vec::with_capacity(batch);

        let messages_result = self
            .consumer
            .fetch()
            .max_messages(batch)
            .expires(timeout)
            .messages()
            .await;

        let mut messages = match messages_result {
            Ok(msgs) => msgs,
            Err(e) => {
                if is_timeout(&e.to_string()) {
                    return Ok(collected);
                }
                return Err(PlatformError::TransientBus(e.to_string()));
            }
        };

        while let Some(message) = messages.next().await {
            match message {
                Ok(msg) => collected.push(msg),
                Err(e) => {
                    if is_timeout(&e.to_string()) {
                        break;
                    }
                    return Err(PlatformError::TransientBus(e.to_string()));
                }
            }
        }

        Ok(collected)
    }
}

fn is_timeout(error: &str) -> bool {
    let msg = error.to_lowercase();
    msg.contains("timeout") || msg.contains("timed out") || msg.contains("no messages")
}

/// Acknowledge a message after successful processing
pub async fn ack(message: &jetstream::Message) -> PlatformResult<()> {
    message
        .ack()
        .await
        .map_err(|e| PlatformError::NatsConsumer(e.to_string()))
}

/// Negatively acknowledge a message so the bus redelivers it
pub async fn nak(message: &jetstream::Message) -> PlatformResult<()> {
    message
        .ack_with(AckKind::Nak(None))
        .await
        .map_err(|e| {
            warn!("Failed to NAK message: {e}");
            PlatformError::NatsConsumer(e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NatsConfig::default();
        assert_eq!(config.servers, vec!["nats://localhost:4222"]);
        assert_eq!(config.name, "p8fs-client");
    }

    #[test]
    fn test_consumer_option_defaults() {
        let options = ConsumerOptions::default();
        assert_eq!(options.max_deliver, 3);
        assert_eq!(options.ack_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_detection() {
        assert!(is_timeout("request timed out"));
        assert!(is_timeout("Timeout expired"));
        assert!(is_timeout("no messages available"));
        assert!(!is_timeout("connection refused"));
    }
}
