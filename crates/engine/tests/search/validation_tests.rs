//! Parameter validation tests.

use helios_engine::SearchError;
use helios_engine::error::ValidationCode;

use crate::common::*;

// ============================================================================
// Unknown parameters
// ============================================================================

#[tokio::test]
async fn test_unknown_parameter_on_every_type() {
    let store = seeded_store([patient("p1", "Chalmers", "1974-12-25")]);
    let service = search_service(store.clone());
    let catalog = helios_engine::ParameterCatalog::builtin().unwrap();

    for resource_type in catalog.resource_types() {
        let result = search(&service, resource_type, "shoe-size=12").await;
        let Err(SearchError::Validation(errors)) = result else {
            panic!("{} accepted an unknown parameter", resource_type);
        };
        assert!(errors.contains(ValidationCode::UnknownParameter));
    }

    // Rejected before any plan reached storage.
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn test_every_problem_is_reported() {
    let service = search_service(seeded_store([]));
    let result = search(
        &service,
        "Patient",
        "shoe-size=12&birthdate=yesterday&gender:fuzzy=female&name=ok",
    )
    .await;

    let Err(SearchError::Validation(errors)) = result else {
        panic!("expected validation errors");
    };
    assert_eq!(errors.len(), 3);
    assert!(errors.contains(ValidationCode::UnknownParameter));
    assert!(errors.contains(ValidationCode::FormatInvalid));
    assert!(errors.contains(ValidationCode::UnsupportedModifier));

    let outcome = errors.to_operation_outcome();
    assert_eq!(outcome.issue.len(), 3);
}

#[tokio::test]
async fn test_chain_too_deep() {
    let service = search_service(seeded_store([]));
    let result = search(&service, "Observation", "patient.organization.partof.name=Acme").await;
    let Err(SearchError::Validation(errors)) = result else {
        panic!("expected a validation error");
    };
    assert!(errors.contains(ValidationCode::ChainTooDeep));
}

#[tokio::test]
async fn test_multiple_values_are_all_used() {
    let service = search_service(seeded_store([
        patient("p1", "Chalmers", "1974-12-25"),
        patient("p2", "Windsor", "1948-11-14"),
        patient("p3", "Baxter", "1990-01-01"),
    ]));
    let bundle = search(&service, "Patient", "family=chalmers,windsor&_sort=_id")
        .await
        .unwrap();
    assert_eq!(match_ids(&bundle), vec!["p1", "p2"]);
}

// ============================================================================
// Result parameters
// ============================================================================

#[tokio::test]
async fn test_total_is_a_known_parameter() {
    let service = search_service(seeded_store([patient("p1", "Chalmers", "1974-12-25")]));
    for mode in ["none", "estimate", "accurate"] {
        let query = format!("family=chalmers&_total={}", mode);
        assert!(search(&service, "Patient", &query).await.is_ok(), "{}", query);
    }

    let Err(SearchError::Validation(errors)) =
        search(&service, "Patient", "_total=precise").await
    else {
        panic!("expected a validation error");
    };
    assert!(errors.contains(ValidationCode::FormatInvalid));
    assert!(!errors.contains(ValidationCode::UnknownParameter));

    let Err(SearchError::Validation(errors)) =
        search(&service, "Patient", "_total=none&_total=accurate").await
    else {
        panic!("expected a validation error");
    };
    assert!(errors.contains(ValidationCode::ParameterConflict));
}
