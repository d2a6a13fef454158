//! Repository invariants: tenant isolation, KV TTL, and search projection

use serde_json::json;
use std::sync::Arc;

use p8fs_core::embeddings::EmbeddingRegistry;
use p8fs_core::models::{Moment, Resource};
use p8fs_core::repository::{
    EntityStore, Filter, KvStore, MemoryKvStore, MemoryStore, OrderBy, QueryHint,
    TenantRepository,
};
use p8fs_core::PlatformError;

fn backends() -> (Arc<dyn EntityStore>, EmbeddingRegistry) {
    (
        Arc::new(MemoryStore::new()),
        EmbeddingRegistry::with_local_default(),
    )
}

#[tokio::test]
async fn test_isolated_model_requires_tenant_context() {
    let (store, embeddings) = backends();
    let unscoped: TenantRepository<Resource> = TenantRepository::global(store, embeddings);

    let resource = Resource::new("t1", "r", "c", "text", 0, "/buckets/t1/d/a.txt");
    for result in [
        unscoped.upsert(&resource).await.err(),
        unscoped.get("id").await.err(),
        unscoped.delete("id").await.err(),
        unscoped.select(&[], 10, 0, None).await.err(),
    ] {
        assert!(matches!(
            result,
            Some(PlatformError::MissingTenantContext(_))
        ));
    }
}

#[tokio::test]
async fn test_search_never_crosses_tenants() {
    let (store, embeddings) = backends();
    let repo_a: TenantRepository<Resource> =
        TenantRepository::new(store.clone(), embeddings.clone(), "t1");
    let repo_b: TenantRepository<Resource> =
        TenantRepository::new(store.clone(), embeddings.clone(), "t2");

    let secret = Resource::new(
        "t2",
        "secret",
        "chunk",
        "confidential quarterly numbers",
        0,
        "/buckets/t2/docs/q.txt",
    );
    repo_b.upsert(&secret).await.unwrap();

    let hits = repo_a
        .semantic_search("confidential quarterly numbers", 10, 0.0)
        .await
        .unwrap();
    assert!(hits.is_empty());

    let lexical = repo_a
        .query("confidential", QueryHint::Lexical, 10, 0.0)
        .await
        .unwrap();
    assert!(lexical.is_empty());
}

#[tokio::test]
async fn test_kv_ttl_contract() {
    let kv = MemoryKvStore::new();
    kv.put("device_auth:abc", json!({"status": "pending"}), Some(600))
        .await
        .unwrap();
    kv.put("device_auth:old", json!({"status": "pending"}), Some(-1))
        .await
        .unwrap();

    assert!(kv.get("device_auth:abc").await.unwrap().is_some());
    assert!(kv.get("device_auth:old").await.unwrap().is_none());

    let live = kv.scan("device_auth:", 100).await.unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn test_moment_ordering_and_filtering() {
    let (store, embeddings) = backends();
    let repo: TenantRepository<Moment> = TenantRepository::new(store, embeddings, "t1");

    for (i, kind) in ["meeting", "reflection", "meeting"].iter().enumerate() {
        let mut resource = Resource::new(
            "t1",
            &format!("m{i}"),
            "moment",
            &format!("notes {i}"),
            i as u32,
            "/buckets/t1/moments/log.txt",
        );
        resource.resource_timestamp =
            Some(chrono::Utc::now() - chrono::Duration::hours(i as i64));
        let moment = Moment {
            resource,
            resource_ends_timestamp: None,
            present_persons: Default::default(),
            moment_type: Some(kind.to_string()),
            emotion_tags: vec![],
            topic_tags: vec![format!("topic-{i}")],
            location: None,
            speakers: None,
        };
        moment.validate().unwrap();
        repo.upsert(&moment).await.unwrap();
    }

    let meetings = repo
        .select(
            &[Filter::Eq("moment_type".into(), json!("meeting"))],
            10,
            0,
            Some(OrderBy {
                field: "resource_timestamp".into(),
                descending: true,
            }),
        )
        .await
        .unwrap();
    assert_eq!(meetings.len(), 2);
    // Most recent first
    assert_eq!(meetings[0].resource.name, "m0");
}
