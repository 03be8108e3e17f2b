//! Result projection tests: `_summary` and `_elements`.

use std::collections::BTreeSet;

use helios_engine::search::SUBSETTED_SYSTEM;

use crate::common::*;

fn store() -> std::sync::Arc<helios_engine::backends::memory::MemoryStore> {
    seeded_store([
        patient("p1", "Chalmers", "1974-12-25"),
        observation("o1", "p1", "1234-5", "2024-01-01"),
        observation("o2", "p1", "1234-5", "2024-02-01"),
        observation("o3", "p1", "9999-9", "2024-03-01"),
    ])
}

// ============================================================================
// _summary=count
// ============================================================================

#[tokio::test]
async fn test_summary_count_reads_no_bodies() {
    let store = store();
    let service = search_service(store.clone());
    let bundle = search(&service, "Observation", "code=1234-5&_summary=count")
        .await
        .unwrap();

    assert_eq!(bundle.total, Some(2));
    assert!(bundle.entry.is_empty());
    assert_eq!(store.body_reads(), 0);
}

#[tokio::test]
async fn test_normal_search_reads_bodies() {
    let store = store();
    let service = search_service(store.clone());
    search(&service, "Observation", "code=1234-5").await.unwrap();
    assert!(store.body_reads() > 0);
}

// ============================================================================
// _elements
// ============================================================================

#[tokio::test]
async fn test_elements_keep_only_listed_and_mandatory() {
    let service = search_service(store());
    let bundle = search(&service, "Observation", "_elements=id,status")
        .await
        .unwrap();
    assert_eq!(bundle.entry.len(), 3);

    let allowed: BTreeSet<&str> = ["resourceType", "id", "meta", "status"].into();
    for entry in &bundle.entry {
        let resource = entry.resource.as_ref().unwrap().as_object().unwrap();
        for key in resource.keys() {
            assert!(allowed.contains(key.as_str()), "unexpected element {}", key);
        }
        assert_eq!(resource["status"], "final");
        assert_eq!(resource["meta"]["tag"][0]["system"], SUBSETTED_SYSTEM);
    }
}

#[tokio::test]
async fn test_projection_does_not_touch_stored_bodies() {
    let store = store();
    let service = search_service(store.clone());
    search(&service, "Observation", "_summary=data").await.unwrap();

    let stored = store.get("Observation", "o1").unwrap();
    assert!(stored.content().get("text").is_some());
    assert!(stored.content()["meta"].get("tag").is_none());
}

#[tokio::test]
async fn test_summary_data_drops_text() {
    let service = search_service(store());
    let bundle = search(&service, "Observation", "_id=o1&_summary=data")
        .await
        .unwrap();
    let resource = bundle.entry[0].resource.as_ref().unwrap();
    assert!(resource.get("text").is_none());
    assert!(resource.get("code").is_some());
}
