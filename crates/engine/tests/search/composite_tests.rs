//! Composite parameter tests.

use serde_json::json;

use crate::common::*;

fn store() -> std::sync::Arc<helios_engine::backends::memory::MemoryStore> {
    seeded_store([
        // systolic 120, diastolic 150: the values are on different components
        blood_pressure("bp-crossed", 120.0, 150.0),
        // systolic 150 on the same component as its code
        blood_pressure("bp-high", 150.0, 95.0),
        blood_pressure("bp-normal", 118.0, 76.0),
    ])
}

// ============================================================================
// Same-element matching
// ============================================================================

#[tokio::test]
async fn test_composite_never_matches_across_elements() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "component-code-value-quantity=8480-6$ge140",
    )
    .await
    .unwrap();

    assert_eq!(match_ids(&bundle), vec!["bp-high"]);
    assert_eq!(bundle.total, Some(1));
}

#[tokio::test]
async fn test_composite_with_system() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "component-code-value-quantity=http://loinc.org|8462-4$lt80",
    )
    .await
    .unwrap();
    assert_eq!(match_ids(&bundle), vec!["bp-normal"]);
}

#[tokio::test]
async fn test_composite_or_values() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "component-code-value-quantity=8480-6$ge140,8462-4$lt80&_sort=_id",
    )
    .await
    .unwrap();
    assert_eq!(match_ids(&bundle), vec!["bp-high", "bp-normal"]);
}

#[tokio::test]
async fn test_separate_component_params_do_cross_elements() {
    // Two independent parameters are ANDed per resource, not per element.
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "component-code=8480-6&component-value-quantity=ge140&_sort=_id",
    )
    .await
    .unwrap();
    assert_eq!(match_ids(&bundle), vec!["bp-crossed", "bp-high"]);
}

#[tokio::test]
async fn test_root_level_composite() {
    let service = search_service(seeded_store([
        json!({
            "resourceType": "Observation",
            "id": "glucose",
            "status": "final",
            "code": {"coding": [{"system": LOINC, "code": "2339-0"}]},
            "valueQuantity": {"value": 6.3, "unit": "mmol/L"}
        }),
        json!({
            "resourceType": "Observation",
            "id": "other",
            "status": "final",
            "code": {"coding": [{"system": LOINC, "code": "1234-5"}]},
            "valueQuantity": {"value": 9.0, "unit": "mmol/L"}
        }),
    ]));
    let bundle = search(&service, "Observation", "code-value-quantity=2339-0$gt5")
        .await
        .unwrap();
    assert_eq!(match_ids(&bundle), vec!["glucose"]);
}

#[tokio::test]
async fn test_composite_missing_component_is_rejected() {
    let service = search_service(store());
    let result = search(&service, "Observation", "component-code-value-quantity=8480-6").await;
    assert!(result.is_err());
}
