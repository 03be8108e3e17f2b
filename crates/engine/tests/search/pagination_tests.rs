//! Cursor pagination tests.

use std::collections::BTreeSet;

use helios_engine::search::{CancellationToken, RawParams, SearchService};
use helios_engine::types::Bundle;

use crate::common::*;

fn store() -> std::sync::Arc<helios_engine::backends::memory::MemoryStore> {
    seeded_store((1..=11).map(|n| {
        // Several patients share a birth date so the id tie-break matters.
        let year = 1950 + (n % 4);
        patient(&format!("p{:02}", n), "Pager", &format!("{}-06-01", year))
    }))
}

async fn follow(service: &SearchService, link: &str) -> Bundle {
    let url = url::Url::parse(link).unwrap();
    let raw = RawParams::parse_query(url.query().unwrap_or_default());
    service
        .search("Patient", &raw, CancellationToken::new())
        .await
        .unwrap()
}

/// Walks every page via `next` links and returns the ids in page order.
async fn walk(service: &SearchService, query: &str) -> (Vec<String>, usize) {
    let mut bundle = search(service, "Patient", query).await.unwrap();
    let mut ids = match_ids(&bundle);
    let mut pages = 1;
    while let Some(next) = bundle.link_url("next").map(str::to_string) {
        bundle = follow(service, &next).await;
        ids.extend(match_ids(&bundle));
        pages += 1;
        assert!(pages < 20, "pagination does not terminate");
    }
    (ids, pages)
}

// ============================================================================
// Next links
// ============================================================================

#[tokio::test]
async fn test_next_links_never_repeat_or_skip() {
    let service = search_service(store());
    let (ids, pages) = walk(&service, "family=pager&_count=3&_sort=birthdate").await;

    assert_eq!(pages, 4);
    assert_eq!(ids.len(), 11);
    let unique: BTreeSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), 11);

    let (unpaged, _) = walk(&service, "family=pager&_count=100&_sort=birthdate").await;
    assert_eq!(ids, unpaged);
}

#[tokio::test]
async fn test_default_order_pages_cleanly() {
    let service = search_service(store());
    let (ids, _) = walk(&service, "_count=4").await;
    let unique: BTreeSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), 11);
    assert_eq!(unique.len(), 11);
}

#[tokio::test]
async fn test_descending_sort() {
    let service = search_service(store());
    let (ids, _) = walk(&service, "_count=5&_sort=-_id").await;
    let expected: Vec<String> = (1..=11).rev().map(|n| format!("p{:02}", n)).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_previous_link_returns_to_first_page() {
    let service = search_service(store());
    let first = search(&service, "Patient", "_count=3&_sort=_id").await.unwrap();
    let second = follow(&service, first.link_url("next").unwrap()).await;
    let back = follow(&service, second.link_url("previous").unwrap()).await;

    assert_eq!(match_ids(&back), match_ids(&first));
    assert_eq!(match_ids(&second), vec!["p04", "p05", "p06"]);
}

#[tokio::test]
async fn test_last_page_has_no_next() {
    let service = search_service(store());
    let bundle = search(&service, "Patient", "_count=20").await.unwrap();
    assert_eq!(bundle.total, Some(11));
    assert!(bundle.link_url("next").is_none());
}

#[tokio::test]
async fn test_tampered_cursor_is_rejected() {
    let service = search_service(store());
    let result = search(&service, "Patient", "_count=3&_cursor=not-a-cursor").await;
    assert!(result.is_err());
}

// ============================================================================
// _total
// ============================================================================

#[tokio::test]
async fn test_total_none_leaves_total_out() {
    let service = search_service(store());
    let bundle = search(&service, "Patient", "_count=3&_total=none&_sort=_id")
        .await
        .unwrap();
    assert_eq!(bundle.total, None);
    assert_eq!(match_ids(&bundle), vec!["p01", "p02", "p03"]);

    // The mode is carried on the next link, so later pages stay total-free.
    let next = follow(&service, bundle.link_url("next").unwrap()).await;
    assert_eq!(next.total, None);
    assert_eq!(match_ids(&next), vec!["p04", "p05", "p06"]);
}

#[tokio::test]
async fn test_total_accurate_and_estimate_report_the_count() {
    let service = search_service(store());
    for mode in ["accurate", "estimate"] {
        let bundle = search(&service, "Patient", &format!("_count=3&_total={}", mode))
            .await
            .unwrap();
        assert_eq!(bundle.total, Some(11));
    }
}
