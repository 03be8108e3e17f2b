//! Batch independence tests.

use serde_json::json;

use helios_engine::backends::memory::Operation;
use helios_engine::types::BundleType;

use crate::common::*;

#[tokio::test]
async fn test_entry_two_fails_entries_one_and_three_commit() {
    let store = seeded_store([]);
    store.inject_fault(Operation::Create, "Observation");
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "batch",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    None,
                    Some(json!({"resourceType": "Patient", "name": [{"family": "One"}]})),
                ),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({"resourceType": "Observation", "status": "final"})),
                ),
                request_entry(
                    "PUT",
                    "Patient/three",
                    None,
                    Some(json!({"resourceType": "Patient", "id": "three"})),
                ),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(bundle.bundle_type, BundleType::BatchResponse);
    assert_eq!(statuses(&bundle), vec![201, 500, 201]);
    assert_eq!(store.count_type("Patient"), 2);
    assert!(store.contains("Patient", "three"));
    assert!(bundle.entry[1].response.as_ref().unwrap().outcome.is_some());
    assert!(bundle.entry[0].response.as_ref().unwrap().outcome.is_none());
}

#[tokio::test]
async fn test_malformed_entries_fail_alone() {
    let store = seeded_store([patient("p1", "Chalmers", "1974-12-25")]);
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "batch",
            vec![
                request_entry("PATCH", "Patient/p1", None, None),
                request_entry("GET", "Patient/p1", None, None),
                request_entry("DELETE", "Patient", None, None),
                request_entry("GET", "Patient/missing", None, None),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![405, 200, 400, 404]);
    let read = bundle.entry[1].resource.as_ref().unwrap();
    assert_eq!(read["id"], "p1");
    assert_eq!(
        bundle.entry[1].response.as_ref().unwrap().etag.as_deref(),
        Some("W/\"1\"")
    );
}

#[tokio::test]
async fn test_dependents_of_a_failed_entry_are_not_executed() {
    let store = seeded_store([]);
    store.inject_fault(Operation::Create, "Patient");
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "batch",
            vec![
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({
                        "resourceType": "Observation",
                        "subject": {"reference": "urn:uuid:0b5a8f1e-7c2d-4e3f-a1b2-c3d4e5f6a7b8"}
                    })),
                ),
                request_entry(
                    "POST",
                    "Patient",
                    Some("urn:uuid:0b5a8f1e-7c2d-4e3f-a1b2-c3d4e5f6a7b8"),
                    Some(json!({"resourceType": "Patient"})),
                ),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({"resourceType": "Observation", "status": "final"})),
                ),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![424, 500, 201]);
    assert_eq!(store.count_type("Observation"), 1);
}

#[tokio::test]
async fn test_undeclared_placeholder_fails_only_its_entry() {
    let store = seeded_store([]);
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "batch",
            vec![
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({
                        "resourceType": "Observation",
                        "subject": {"reference": "urn:uuid:00000000-0000-0000-0000-000000000000"}
                    })),
                ),
                request_entry("POST", "Patient", None, Some(json!({"resourceType": "Patient"}))),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![400, 201]);
    assert_eq!(store.len(), 1);
}
