//! Date parameter tests.

use helios_engine::SearchError;
use helios_engine::error::ValidationCode;

use crate::common::*;

fn store() -> std::sync::Arc<helios_engine::backends::memory::MemoryStore> {
    seeded_store([
        observation("o-2019", "p1", "1234-5", "2019-12-31T23:00:00Z"),
        observation("o-2020a", "p1", "1234-5", "2020-01-01T00:00:00Z"),
        observation("o-2020b", "p1", "1234-5", "2020-07-14T10:15:00Z"),
        observation("o-2021", "p1", "1234-5", "2021-01-01T00:00:00Z"),
        observation("o-2022", "p1", "1234-5", "2022-03-05"),
    ])
}

// ============================================================================
// AND across repeats vs OR within a value
// ============================================================================

#[tokio::test]
async fn test_repeated_keys_and_their_ranges() {
    let service = search_service(store());
    let bundle = search(
        &service,
        "Observation",
        "date=ge2020-01-01&date=lt2021-01-01&_sort=date",
    )
    .await
    .unwrap();
    assert_eq!(match_ids(&bundle), vec!["o-2020a", "o-2020b"]);
}

#[tokio::test]
async fn test_prefixed_bounds_in_one_value_are_not_a_range() {
    let service = search_service(store());
    let result = search(&service, "Observation", "date=ge2020-01-01,lt2021-01-01").await;

    let Err(SearchError::Validation(errors)) = result else {
        panic!("expected a validation error");
    };
    assert!(errors.contains(ValidationCode::ParameterConflict));
}

#[tokio::test]
async fn test_comma_separated_values_or_together() {
    let service = search_service(store());
    let bundle = search(&service, "Observation", "date=2019,2022&_sort=date")
        .await
        .unwrap();
    assert_eq!(match_ids(&bundle), vec!["o-2019", "o-2022"]);
}

// ============================================================================
// Precision
// ============================================================================

#[tokio::test]
async fn test_equality_covers_the_whole_precision_range() {
    let service = search_service(store());
    let bundle = search(&service, "Observation", "date=2020&_sort=date")
        .await
        .unwrap();
    assert_eq!(match_ids(&bundle), vec!["o-2020a", "o-2020b"]);

    let bundle = search(&service, "Observation", "date=2020-07").await.unwrap();
    assert_eq!(match_ids(&bundle), vec!["o-2020b"]);
}

#[tokio::test]
async fn test_bad_date_is_format_invalid() {
    let service = search_service(store());
    let Err(SearchError::Validation(errors)) =
        search(&service, "Observation", "date=2020-13-45").await
    else {
        panic!("expected a validation error");
    };
    assert!(errors.contains(ValidationCode::FormatInvalid));
}
