//! Property-based tests for routing and identifier invariants

use proptest::prelude::*;
use serde_json::json;

use p8fs_core::models::device_auth::normalize_user_code;
use p8fs_core::models::ids;
use p8fs_core::router::{enrich_for_routing, routed_file_size};
use p8fs_core::subjects::Tier;
use p8fs_core::StoragePathInfo;

proptest! {
    /// Every event routes to exactly one tier and the enriched size falls
    /// within that tier's threshold.
    #[test]
    fn routing_conservation(size in 0u64..8 * 1024 * 1024 * 1024) {
        let event = json!({"event_type": "create", "path": "/buckets/t/u/f.bin", "size": size});
        let (enriched, subject) = enrich_for_routing(event, "prop-router", 0);

        let routed = enriched["routing"]["file_size_bytes"].as_u64().unwrap();
        prop_assert!(routed >= 1024);
        prop_assert_eq!(routed, routed_file_size(&json!({"size": size})));

        let expected = Tier::for_size(routed).subject();
        prop_assert_eq!(subject, expected);
    }

    /// Derived ids are total functions of their inputs.
    #[test]
    fn file_ids_are_stable(tenant in "[a-z0-9-]{1,20}", uri in "/buckets/[a-z0-9/._-]{1,60}") {
        prop_assert_eq!(ids::file_id(&tenant, &uri), ids::file_id(&tenant, &uri));
    }

    /// Distinct ordinals never collide for the same file.
    #[test]
    fn resource_ids_distinct_by_ordinal(a in 0u32..10_000, b in 0u32..10_000) {
        let file = ids::file_id("t1", "/buckets/t1/d/f.txt");
        if a != b {
            prop_assert_ne!(ids::resource_id(&file, a), ids::resource_id(&file, b));
        } else {
            prop_assert_eq!(ids::resource_id(&file, a), ids::resource_id(&file, b));
        }
    }

    /// Both the hyphenated and bare form of a user code normalize to the
    /// same lookup key.
    #[test]
    fn user_code_forms_converge(code in "[A-Z0-9]{8}") {
        let hyphenated = format!("{}-{}", &code[..4], &code[4..]);
        prop_assert_eq!(normalize_user_code(&code), normalize_user_code(&hyphenated));
    }

    /// Tenant path parsing never panics and classifies consistently.
    #[test]
    fn path_parsing_is_total(path in "/?[a-zA-Z0-9/._=-]{0,80}") {
        let info = StoragePathInfo::from_full_path(&path);
        if info.is_tenant_path {
            prop_assert!(info.tenant_id.is_some());
            prop_assert_eq!(info.bucket.as_deref(), Some("buckets"));
        } else {
            prop_assert!(info.tenant_id.is_none());
        }
    }
}
