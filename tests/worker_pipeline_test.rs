//! End-to-end worker pipeline tests against in-memory backends
//!
//! Covers the ingestion invariants: idempotent re-processing, chunk ordinal
//! uniqueness, parser-absent behavior, Engram dispatch, and delete cascade.

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;

use p8fs_core::models::ids;
use p8fs_core::repository::EntityStore;
use p8fs_core::StorageEvent;

fn create_event(path: &str, size: u64) -> StorageEvent {
    StorageEvent::from_raw(&json!({
        "event_type": "create",
        "path": path,
        "size": size,
        "timestamp": 1_700_000_000.0
    }))
    .unwrap()
}

/// Five paragraphs of five words each: five chunks at the test chunk size
fn five_paragraphs() -> String {
    (0..5)
        .map(|i| format!("para {i} word word word"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[tokio::test]
async fn test_processing_same_event_twice_is_idempotent() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/report.txt";
    fixture.objects.put(path, five_paragraphs());

    let event = create_event(path, 120);
    fixture.processor.process_file(&event).await.unwrap();

    let files_after_first = fixture.store.scan("files").await.unwrap();
    let resources_after_first = fixture.store.scan("resources").await.unwrap();
    let embeddings_after_first = fixture.store.scan("embeddings").await.unwrap();
    assert_eq!(files_after_first.len(), 1);
    assert_eq!(resources_after_first.len(), 5);
    assert_eq!(embeddings_after_first.len(), 5);

    // Second run lands on exactly the same rows
    fixture.processor.process_file(&event).await.unwrap();

    let files = fixture.store.scan("files").await.unwrap();
    let resources = fixture.store.scan("resources").await.unwrap();
    let embeddings = fixture.store.scan("embeddings").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(resources.len(), 5);
    assert_eq!(embeddings.len(), 5);

    // Ids are derived, not random
    let file_id = ids::file_id("t1", path);
    assert_eq!(files[0]["id"], json!(file_id.to_string()));

    let expected_resource_ids: HashSet<String> = (0..5)
        .map(|i| ids::resource_id(&file_id, i).to_string())
        .collect();
    let actual_resource_ids: HashSet<String> = resources
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actual_resource_ids, expected_resource_ids);
}

#[tokio::test]
async fn test_chunk_ordinals_are_unique_per_uri() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/notes.txt";
    fixture.objects.put(path, five_paragraphs());

    fixture
        .processor
        .process_file(&create_event(path, 100))
        .await
        .unwrap();

    let resources = fixture.store.scan("resources").await.unwrap();
    let mut seen = HashSet::new();
    for row in &resources {
        let key = (
            row["tenant_id"].as_str().unwrap().to_string(),
            row["uri"].as_str().unwrap().to_string(),
            row["ordinal"].as_u64().unwrap(),
        );
        assert!(seen.insert(key), "duplicate (tenant, uri, ordinal)");
    }
}

#[tokio::test]
async fn test_absent_parser_keeps_file_row_without_chunks() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/scan.pdf";
    fixture.objects.put(path, vec![0u8; 64]);

    fixture
        .processor
        .process_file(&create_event(path, 64))
        .await
        .unwrap();

    assert_eq!(fixture.store.scan("files").await.unwrap().len(), 1);
    assert!(fixture.store.scan("resources").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_object_is_an_error() {
    let fixture = common::fixture("t1");
    let event = create_event("/buckets/t1/docs/ghost.txt", 10);
    // The worker naks on this so the bus redelivers
    assert!(fixture.processor.process_file(&event).await.is_err());
}

#[tokio::test]
async fn test_engram_document_skips_chunking() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/knowledge.yaml";
    fixture.objects.put(
        path,
        r#"
kind: Engram
name: meeting-notes
entities:
  - name: "Q4 Planning Meeting"
    category: moment
    content: "Notes from the Q4 planning meeting"
"#,
    );

    fixture
        .processor
        .process_file(&create_event(path, 100))
        .await
        .unwrap();

    let resources = fixture.store.scan("resources").await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["name"], "Q4 Planning Meeting");
    // Engram output, not default chunking
    assert_ne!(resources[0]["category"], "content_chunk");
}

#[tokio::test]
async fn test_plain_yaml_falls_back_to_chunking() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/config.yaml";
    fixture.objects.put(path, "name: just-config\nvalue: 42\n");

    fixture
        .processor
        .process_file(&create_event(path, 30))
        .await
        .unwrap();

    // No registered parser for .yaml, so fallback produces no chunks but
    // the file row survives
    assert_eq!(fixture.store.scan("files").await.unwrap().len(), 1);
    assert!(fixture.store.scan("resources").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_removes_file_resources_and_embeddings() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/gone.txt";
    fixture.objects.put(path, five_paragraphs());

    fixture
        .processor
        .process_file(&create_event(path, 100))
        .await
        .unwrap();
    assert_eq!(fixture.store.scan("resources").await.unwrap().len(), 5);
    assert_eq!(fixture.store.scan("embeddings").await.unwrap().len(), 5);

    fixture.objects.remove(path);
    fixture
        .processor
        .delete_file(ids::file_id("t1", path))
        .await
        .unwrap();

    assert!(fixture.store.scan("files").await.unwrap().is_empty());
    assert!(fixture.store.scan("resources").await.unwrap().is_empty());
    assert!(fixture.store.scan("embeddings").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_replaces_chunks_in_place() {
    let fixture = common::fixture("t1");
    let path = "/buckets/t1/docs/living.txt";
    fixture.objects.put(path, five_paragraphs());
    fixture
        .processor
        .process_file(&create_event(path, 100))
        .await
        .unwrap();

    // Re-upload with fewer paragraphs; ordinals 0..2 are replaced in place
    fixture
        .objects
        .put(path, "alpha beta gamma delta epsilon\n\nzeta eta theta iota kappa");
    let update = StorageEvent::from_raw(&json!({
        "event_type": "update",
        "path": path,
        "size": 60
    }))
    .unwrap();
    fixture.processor.process_file(&update).await.unwrap();

    let resources = fixture.store.scan("resources").await.unwrap();
    let file_id = ids::file_id("t1", path);
    let replaced: Vec<&Value> = resources
        .iter()
        .filter(|r| r["id"] == json!(ids::resource_id(&file_id, 0).to_string()))
        .collect();
    assert_eq!(replaced.len(), 1);
    assert!(replaced[0]["content"]
        .as_str()
        .unwrap()
        .starts_with("alpha beta"));
}
