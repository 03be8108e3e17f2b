//! Transaction atomicity tests.

use serde_json::json;

use helios_engine::backends::memory::Operation;
use helios_engine::transaction::TransactionKind;
use helios_engine::types::BundleType;

use crate::common::*;

// ============================================================================
// Compensation
// ============================================================================

#[tokio::test]
async fn test_invalid_entry_rejects_before_any_write() {
    let store = seeded_store([patient("keep", "Original", "1970-01-01")]);
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    Some("urn:uuid:9d7d2c7e-1d0e-4c1f-8c8e-1c6f3b0a1a01"),
                    Some(json!({"resourceType": "Patient", "name": [{"family": "New"}]})),
                ),
                // Body id does not match the url.
                request_entry(
                    "PUT",
                    "Patient/keep",
                    None,
                    Some(json!({"resourceType": "Patient", "id": "other"})),
                ),
                request_entry(
                    "PUT",
                    "Patient/keep",
                    None,
                    Some(json!({"resourceType": "Patient", "id": "keep", "name": [{"family": "Changed"}]})),
                ),
            ],
        ))
        .await;

    // The id mismatch is caught while planning, so nothing was written.
    assert!(bundle.is_err());
    assert_eq!(store.count_type("Patient"), 1);
}

#[tokio::test]
async fn test_entry_two_fails_entries_one_and_three_are_compensated() {
    let store = seeded_store([patient("keep", "Original", "1970-01-01")]);
    store.inject_fault(Operation::Create, "Observation");
    let processor = processor(store.clone());

    // Entry 2 references entry 3, so entry 3 runs before entry 2 fails.
    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    Some("urn:uuid:9d7d2c7e-1d0e-4c1f-8c8e-1c6f3b0a1a01"),
                    Some(json!({"resourceType": "Patient", "name": [{"family": "New"}]})),
                ),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({
                        "resourceType": "Observation",
                        "status": "final",
                        "subject": {"reference": "urn:uuid:4f1c1b7a-2b8e-4d5e-9a6b-0c2d3e4f5a02"}
                    })),
                ),
                request_entry(
                    "PUT",
                    "Patient/keep",
                    Some("urn:uuid:4f1c1b7a-2b8e-4d5e-9a6b-0c2d3e4f5a02"),
                    Some(json!({"resourceType": "Patient", "id": "keep", "name": [{"family": "Changed"}]})),
                ),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(bundle.bundle_type, BundleType::TransactionResponse);
    assert_eq!(statuses(&bundle), vec![424, 500, 424]);

    assert_eq!(store.count_type("Patient"), 1);
    assert_eq!(store.count_type("Observation"), 0);
    let kept = store.get("Patient", "keep").unwrap();
    assert_eq!(kept.content()["name"][0]["family"], "Original");

    assert!(entry_diagnostics(&bundle, 0).starts_with("rolled back"));
    assert!(entry_diagnostics(&bundle, 2).starts_with("rolled back"));
    assert!(bundle.entry[0].response.as_ref().unwrap().location.is_none());
}

#[tokio::test]
async fn test_entries_after_the_failure_are_not_executed() {
    let store = seeded_store([]);
    store.inject_fault(Operation::Create, "Observation");
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({"resourceType": "Observation", "status": "final"})),
                ),
                request_entry("POST", "Patient", None, Some(json!({"resourceType": "Patient"}))),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![500, 424]);
    assert!(entry_diagnostics(&bundle, 1).starts_with("not executed"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_deleted_resource_is_recreated() {
    let store = seeded_store([patient("gone", "Deleted", "1970-01-01")]);
    store.inject_fault(Operation::Create, "Observation");
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry("DELETE", "Patient/gone", None, None),
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

    assert_eq!(statuses(&bundle), vec![424, 500]);
    let restored = store.get("Patient", "gone").unwrap();
    assert_eq!(restored.content()["name"][0]["family"], "Deleted");
}

#[tokio::test]
async fn test_profile_failure_rolls_back() {
    use async_trait::async_trait;
    use helios_engine::ProfileValidator;
    use helios_engine::core::ProfileValidation;
    use helios_engine::types::{Issue, IssueType};
    use serde_json::Value;
    use std::sync::Arc;

    struct NoDraftObservations;

    #[async_trait]
    impl ProfileValidator for NoDraftObservations {
        async fn validate_profile(
            &self,
            resource_type: &str,
            document: &Value,
        ) -> ProfileValidation {
            if resource_type == "Observation" && document["status"] == "preliminary" {
                ProfileValidation::with_issues(vec![Issue::error(
                    IssueType::Invalid,
                    "Observation.status: preliminary results are not accepted",
                )])
            } else {
                ProfileValidation::valid()
            }
        }
    }

    let store = seeded_store([]);
    let processor = processor(store.clone()).with_validator(Arc::new(NoDraftObservations));
    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    None,
                    Some(json!({"resourceType": "Patient"})),
                ),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({"resourceType": "Observation", "status": "preliminary"})),
                ),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![424, 422]);
    assert!(store.is_empty());
    assert!(entry_diagnostics(&bundle, 1).contains("preliminary"));
}

#[test]
fn test_kinds() {
    assert!(TransactionKind::Transaction.is_atomic());
    assert!(!TransactionKind::Batch.is_atomic());
}
