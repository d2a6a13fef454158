//! JetStream routing integration tests
//!
//! These require a running NATS server with JetStream and are marked with
//! #[ignore]. Run with: cargo test --test jetstream_routing_test -- --ignored

use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

use p8fs_core::nats::{self, ConsumerOptions, NatsClient, NatsConfig};
use p8fs_core::subjects::{Tier, ROUTER_CONSUMER, STORAGE_EVENTS_STREAM, STORAGE_EVENTS_SUBJECT};
use p8fs_core::TieredStorageRouter;

async fn connect() -> NatsClient {
    let config = NatsConfig {
        servers: vec![std::env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string())],
        name: "p8fs-routing-test".to_string(),
        ..NatsConfig::default()
    };
    NatsClient::new(config).await.expect("NATS server required")
}

#[tokio::test]
#[ignore] // Requires NATS server
async fn test_router_setup_is_idempotent() {
    let client = connect().await;
    let (_tx, shutdown) = watch::channel(false);

    let mut router = TieredStorageRouter::new(client.clone(), None, shutdown.clone());
    router.setup().await.unwrap();

    // A second instance joins the same shared consumer without error
    let mut second = TieredStorageRouter::new(client, Some("router-b".into()), shutdown);
    second.setup().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires NATS server
async fn test_small_event_lands_on_small_subject() {
    let client = connect().await;
    let (tx, shutdown) = watch::channel(false);

    let mut router = TieredStorageRouter::new(client.clone(), None, shutdown);
    router.setup().await.unwrap();

    // Drain observer on the small tier
    let observer = "routing-test-observer";
    client
        .ensure_consumer(
            &Tier::Small.stream(),
            observer,
            ConsumerOptions::default(),
        )
        .await
        .unwrap();
    let subscription = client
        .pull_subscribe(&Tier::Small.stream(), observer)
        .await
        .unwrap();

    client
        .publish_json(
            STORAGE_EVENTS_SUBJECT,
            &json!({
                "event_type": "create",
                "path": "/buckets/t1/uploads/a.txt",
                "size": 100
            }),
        )
        .await
        .unwrap();

    let run = tokio::spawn(async move { router.run().await });

    let mut routed = None;
    for _ in 0..10 {
        let batch = subscription
            .fetch(1, Duration::from_secs(2))
            .await
            .unwrap();
        if let Some(message) = batch.into_iter().next() {
            routed = Some(serde_json::from_slice::<serde_json::Value>(&message.payload).unwrap());
            nats::ack(&message).await.unwrap();
            break;
        }
    }

    let _ = tx.send(true);
    let _ = run.await;

    let routed = routed.expect("event was not routed to the small tier");
    assert_eq!(routed["routing"]["file_size_bytes"], 1024);
    assert_eq!(
        routed["routing"]["target_subject"],
        "p8fs.storage.events.small"
    );

    let _ = client
        .delete_consumer(&Tier::Small.stream(), observer)
        .await;
}

#[tokio::test]
#[ignore] // Requires NATS server
async fn test_legacy_consumers_are_cleaned_up() {
    let client = connect().await;

    client
        .ensure_stream(
            STORAGE_EVENTS_STREAM,
            vec![STORAGE_EVENTS_SUBJECT.to_string()],
        )
        .await
        .unwrap();
    client
        .ensure_consumer(
            STORAGE_EVENTS_STREAM,
            "router-consumer",
            ConsumerOptions::default(),
        )
        .await
        .unwrap();

    let (_tx, shutdown) = watch::channel(false);
    let mut router = TieredStorageRouter::new(client.clone(), None, shutdown);
    router.setup().await.unwrap();

    // The legacy consumer is gone; the shared consumer survives
    assert!(!client
        .delete_consumer(STORAGE_EVENTS_STREAM, "router-consumer")
        .await
        .unwrap());
    assert!(client
        .pull_subscribe(STORAGE_EVENTS_STREAM, ROUTER_CONSUMER)
        .await
        .is_ok());
}
