//! `_include` / `_revinclude` and chained search tests.

use serde_json::json;

use helios_engine::EngineConfig;
use helios_engine::backends::memory::Operation;

use crate::common::*;

fn store() -> std::sync::Arc<helios_engine::backends::memory::MemoryStore> {
    seeded_store([
        json!({"resourceType": "Organization", "id": "org1", "name": "Acme Health"}),
        json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [{"family": "Chalmers"}],
            "managingOrganization": {"reference": "Organization/org1"}
        }),
        patient("p2", "Windsor", "1948-11-14"),
        observation("o1", "p1", "1234-5", "2024-01-01"),
        observation("o2", "p1", "1234-5", "2024-02-01"),
        observation("o3", "p2", "1234-5", "2024-03-01"),
    ])
}

// ============================================================================
// Includes
// ============================================================================

#[tokio::test]
async fn test_include_adds_each_target_once() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "subject=Patient/p1&_include=Observation:subject&_sort=_id",
    )
    .await
    .unwrap();

    assert_eq!(match_ids(&bundle), vec!["o1", "o2"]);
    assert_eq!(include_ids(&bundle), vec!["p1"]);
    assert_eq!(bundle.total, Some(2));
}

#[tokio::test]
async fn test_revinclude() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Patient",
        "_id=p2&_revinclude=Observation:subject",
    )
    .await
    .unwrap();

    assert_eq!(match_ids(&bundle), vec!["p2"]);
    assert_eq!(include_ids(&bundle), vec!["o3"]);
}

#[tokio::test]
async fn test_include_failure_is_a_warning() {
    let store = store();
    store.inject_fault(Operation::Fetch, "Patient");
    let service = search_service(store);
    let bundle = search(
        &service,
        "Observation",
        "subject=Patient/p1&_include=Observation:subject",
    )
    .await
    .unwrap();

    assert_eq!(match_ids(&bundle).len(), 2);
    assert!(include_ids(&bundle).is_empty());
    let warnings: Vec<_> = bundle.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].issue[0].diagnostics.contains("PARTIAL_INCLUDE_FAILURE"));
}

#[tokio::test]
async fn test_capped_include_is_a_warning() {
    let config = EngineConfig {
        max_include_results: 1,
        ..EngineConfig::for_testing()
    };
    let service = search_service_with(store(), config);
    let bundle = search(&service, "Observation", "_include=Observation:subject")
        .await
        .unwrap();

    assert_eq!(match_ids(&bundle).len(), 3);
    assert_eq!(include_ids(&bundle).len(), 1);
    let warnings: Vec<_> = bundle.warnings().collect();
    assert_eq!(warnings.len(), 1);
    let diagnostics = &warnings[0].issue[0].diagnostics;
    assert!(diagnostics.contains("PARTIAL_INCLUDE_FAILURE"));
    assert!(diagnostics.contains("capped at 1"));
}

// ============================================================================
// Chains
// ============================================================================

#[tokio::test]
async fn test_two_level_chain() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "patient.organization.name=acme&_sort=_id",
    )
    .await
    .unwrap();
    assert_eq!(match_ids(&bundle), vec!["o1", "o2"]);
}

#[tokio::test]
async fn test_reverse_chain() {
    let service = search_service(store());
    let bundle = search(&service, "Patient", "_has:Observation:subject:_id=o3")
        .await
        .unwrap();
    assert_eq!(match_ids(&bundle), vec!["p2"]);
}

#[tokio::test]
async fn test_capped_chain_is_a_warning() {
    let config = EngineConfig {
        max_chain_results: 1,
        ..EngineConfig::for_testing()
    };
    let service = search_service_with(store(), config);
    let bundle = search(&service, "Patient", "_has:Observation:subject:code=1234-5")
        .await
        .unwrap();

    assert_eq!(match_ids(&bundle).len(), 1);
    let warnings: Vec<_> = bundle.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].issue[0].diagnostics.contains("more than 1"));
}
