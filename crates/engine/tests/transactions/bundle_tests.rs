//! Request Bundle tests: placeholder resolution, ordering, and response shape.

use serde_json::json;

use helios_engine::TransactionError;
use helios_engine::transaction::TransactionPlan;

use crate::common::*;

const PATIENT_URN: &str = "urn:uuid:61ebe359-bfdc-4613-8bf2-c5e300945f0a";
const ENCOUNTER_URN: &str = "urn:uuid:88f151c0-a954-468a-88ae-9d8f1b2c3d4e";

// ============================================================================
// urn:uuid resolution
// ============================================================================

#[tokio::test]
async fn test_placeholders_become_server_references() {
    let store = seeded_store([]);
    let processor = processor(store.clone());

    let bundle = processor
        .process(&request_bundle(
            "transaction",
            vec![
                // Declared after its users: ordering must still create it first.
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({
                        "resourceType": "Observation",
                        "status": "final",
                        "subject": {"reference": PATIENT_URN},
                        "encounter": {"reference": format!("Encounter/{}", ENCOUNTER_URN)}
                    })),
                ),
                request_entry(
                    "POST",
                    "Encounter",
                    Some(ENCOUNTER_URN),
                    Some(json!({
                        "resourceType": "Encounter",
                        "status": "finished",
                        "subject": {"reference": PATIENT_URN}
                    })),
                ),
                request_entry(
                    "POST",
                    "Patient",
                    Some(PATIENT_URN),
                    Some(json!({"resourceType": "Patient", "name": [{"family": "Chalmers"}]})),
                ),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(statuses(&bundle), vec![201, 201, 201]);

    let location = |i: usize| {
        bundle.entry[i]
            .response
            .as_ref()
            .and_then(|r| r.location.clone())
            .unwrap()
    };
    let patient_id = location(2).split('/').nth(1).unwrap().to_string();
    let encounter_id = location(1).split('/').nth(1).unwrap().to_string();
    let observation_id = location(0).split('/').nth(1).unwrap().to_string();

    let observation = store.get("Observation", &observation_id).unwrap();
    assert_eq!(
        observation.content()["subject"]["reference"],
        format!("Patient/{}", patient_id)
    );
    assert_eq!(
        observation.content()["encounter"]["reference"],
        format!("Encounter/{}", encounter_id)
    );
    let encounter = store.get("Encounter", &encounter_id).unwrap();
    assert_eq!(
        encounter.content()["subject"]["reference"],
        format!("Patient/{}", patient_id)
    );

    assert_eq!(
        bundle.entry[2].full_url.as_deref(),
        Some(format!("http://test.local/fhir/Patient/{}", patient_id).as_str())
    );
}

#[tokio::test]
async fn test_created_resources_are_searchable() {
    let store = seeded_store([]);
    processor(store.clone())
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    Some(PATIENT_URN),
                    Some(json!({"resourceType": "Patient", "name": [{"family": "Chalmers"}]})),
                ),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({
                        "resourceType": "Observation",
                        "status": "final",
                        "code": {"coding": [{"system": LOINC, "code": "1234-5"}]},
                        "subject": {"reference": PATIENT_URN}
                    })),
                ),
            ],
        ))
        .await
        .unwrap();

    let service = search_service(store);
    let bundle = search(&service, "Observation", "subject:Patient.family=chalmers")
        .await
        .unwrap();
    assert_eq!(bundle.total, Some(1));
}

#[tokio::test]
async fn test_undeclared_placeholder_rejects_transaction() {
    let store = seeded_store([]);
    let result = processor(store.clone())
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry("POST", "Patient", None, Some(json!({"resourceType": "Patient"}))),
                request_entry(
                    "POST",
                    "Observation",
                    None,
                    Some(json!({"resourceType": "Observation", "subject": {"reference": PATIENT_URN}})),
                ),
            ],
        ))
        .await;

    assert_eq!(
        result.unwrap_err(),
        TransactionError::UnresolvedReference {
            index: 1,
            reference: PATIENT_URN.to_string()
        }
    );
    assert!(store.is_empty());
}

// ============================================================================
// Circular references
// ============================================================================

#[tokio::test]
async fn test_cycle_is_rejected_before_any_write() {
    let store = seeded_store([]);
    let result = processor(store.clone())
        .process(&request_bundle(
            "transaction",
            vec![
                request_entry(
                    "POST",
                    "Patient",
                    Some(PATIENT_URN),
                    Some(json!({
                        "resourceType": "Patient",
                        "generalPractitioner": [{"reference": ENCOUNTER_URN}]
                    })),
                ),
                request_entry(
                    "POST",
                    "Encounter",
                    Some(ENCOUNTER_URN),
                    Some(json!({"resourceType": "Encounter", "subject": {"reference": PATIENT_URN}})),
                ),
            ],
        ))
        .await;

    let Err(error) = result else {
        panic!("expected a circular reference error");
    };
    assert_eq!(error.code().as_str(), "CIRCULAR_REFERENCE");
    let TransactionError::CircularReference { cycle } = &error else {
        panic!("expected a circular reference error");
    };
    assert!(cycle.contains(&PATIENT_URN.to_string()));
    assert!(cycle.contains(&ENCOUNTER_URN.to_string()));
    assert!(store.is_empty());

    let outcome = error.to_operation_outcome();
    assert!(outcome.issue[0].diagnostics.contains("CIRCULAR_REFERENCE"));
}

#[test]
fn test_plan_orders_independent_entries_by_position() {
    let plan = TransactionPlan::build(&request_bundle(
        "batch",
        vec![
            request_entry("GET", "Patient/a", None, None),
            request_entry("GET", "Patient/b", None, None),
            request_entry("GET", "Patient/c", None, None),
        ],
    ))
    .unwrap();
    assert_eq!(plan.order, vec![0, 1, 2]);
    assert!(plan.id_bindings.is_empty());
}

// ============================================================================
// Input shape
// ============================================================================

#[tokio::test]
async fn test_non_bundle_input() {
    let store = seeded_store([]);
    let processor = processor(store);
    for input in [
        json!({"resourceType": "Patient"}),
        json!({"resourceType": "Bundle", "type": "collection"}),
        json!({"resourceType": "Bundle", "type": "batch", "entry": {}}),
        json!("not even an object"),
    ] {
        let result = processor.process(&input).await;
        assert!(
            matches!(result, Err(TransactionError::InvalidBundle { .. })),
            "accepted {}",
            input
        );
    }
}
