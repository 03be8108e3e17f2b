//! Shared fixtures for engine integration tests.
//!
//! Builds an in-memory store seeded with FHIR JSON, plus the search and
//! transaction front ends wired to it.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use helios_engine::backends::memory::MemoryStore;
use helios_engine::search::{CancellationToken, RawParams};
use helios_engine::types::{Bundle, SearchEntryMode};
use helios_engine::{
    EngineConfig, ParameterCatalog, SearchError, SearchService, TransactionProcessor,
};

pub const LOINC: &str = "http://loinc.org";
pub const SYSTOLIC: &str = "8480-6";
pub const DIASTOLIC: &str = "8462-4";

// ============================================================================
// Wiring
// ============================================================================

/// Creates a store holding `resources`.
pub fn seeded_store(resources: impl IntoIterator<Item = Value>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for resource in resources {
        store.insert_json(resource).expect("seed resource");
    }
    store
}

/// Creates a search service over `store` with test configuration.
pub fn search_service(store: Arc<MemoryStore>) -> SearchService {
    search_service_with(store, EngineConfig::for_testing())
}

/// Creates a search service over `store` with the given configuration.
pub fn search_service_with(store: Arc<MemoryStore>, config: EngineConfig) -> SearchService {
    let catalog = ParameterCatalog::builtin().expect("builtin catalog");
    SearchService::new(config, Arc::new(catalog), store)
}

/// Creates a transaction processor over `store`.
pub fn processor(store: Arc<MemoryStore>) -> TransactionProcessor {
    TransactionProcessor::new(store).with_base_url("http://test.local/fhir")
}

/// Runs a search given as a query string.
pub async fn search(
    service: &SearchService,
    resource_type: &str,
    query: &str,
) -> Result<Bundle, SearchError> {
    service
        .search(
            resource_type,
            &RawParams::parse_query(query),
            CancellationToken::new(),
        )
        .await
}

// ============================================================================
// Bundle inspection
// ============================================================================

/// Ids of the `match` entries, in Bundle order.
pub fn match_ids(bundle: &Bundle) -> Vec<String> {
    entry_ids(bundle, SearchEntryMode::Match)
}

/// Ids of the `include` entries, in Bundle order.
pub fn include_ids(bundle: &Bundle) -> Vec<String> {
    entry_ids(bundle, SearchEntryMode::Include)
}

fn entry_ids(bundle: &Bundle, mode: SearchEntryMode) -> Vec<String> {
    bundle
        .entry
        .iter()
        .filter(|e| e.search.as_ref().map(|s| s.mode) == Some(mode))
        .filter_map(|e| e.resource.as_ref()?.get("id")?.as_str().map(String::from))
        .collect()
}

/// Numeric response status of each entry of a transaction or batch response.
pub fn statuses(bundle: &Bundle) -> Vec<u16> {
    bundle
        .entry
        .iter()
        .map(|e| {
            e.response
                .as_ref()
                .and_then(|r| r.status_code())
                .expect("entry response status")
        })
        .collect()
}

/// Diagnostics of the first issue on entry `index`'s response outcome.
pub fn entry_diagnostics(bundle: &Bundle, index: usize) -> String {
    bundle.entry[index]
        .response
        .as_ref()
        .and_then(|r| r.outcome.as_ref())
        .and_then(|o| o.issue.first())
        .map(|i| i.diagnostics.clone())
        .unwrap_or_default()
}

// ============================================================================
// Resources
// ============================================================================

/// A patient with a family name and birth date.
pub fn patient(id: &str, family: &str, birth_date: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "id": id,
        "active": true,
        "name": [{"family": family, "given": ["Test"]}],
        "gender": "unknown",
        "birthDate": birth_date
    })
}

/// A final vital-signs observation for `patient` effective at `date`.
pub fn observation(id: &str, patient: &str, code: &str, date: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": LOINC, "code": code}]},
        "subject": {"reference": format!("Patient/{}", patient)},
        "effectiveDateTime": date,
        "text": {"status": "generated", "div": "<div>vitals</div>"}
    })
}

/// A blood-pressure panel with systolic and diastolic components.
pub fn blood_pressure(id: &str, systolic: f64, diastolic: f64) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": LOINC, "code": "85354-9"}]},
        "effectiveDateTime": "2024-01-15T09:30:00Z",
        "component": [
            {
                "code": {"coding": [{"system": LOINC, "code": SYSTOLIC}]},
                "valueQuantity": {"value": systolic, "unit": "mmHg", "system": "http://unitsofmeasure.org", "code": "mm[Hg]"}
            },
            {
                "code": {"coding": [{"system": LOINC, "code": DIASTOLIC}]},
                "valueQuantity": {"value": diastolic, "unit": "mmHg", "system": "http://unitsofmeasure.org", "code": "mm[Hg]"}
            }
        ]
    })
}

/// A request entry for a transaction or batch Bundle.
pub fn request_entry(
    method: &str,
    url: &str,
    full_url: Option<&str>,
    resource: Option<Value>,
) -> Value {
    let mut entry = json!({"request": {"method": method, "url": url}});
    if let Some(full_url) = full_url {
        entry["fullUrl"] = json!(full_url);
    }
    if let Some(resource) = resource {
        entry["resource"] = resource;
    }
    entry
}

/// A transaction or batch Bundle.
pub fn request_bundle(kind: &str, entries: Vec<Value>) -> Value {
    json!({"resourceType": "Bundle", "type": kind, "entry": entries})
}
