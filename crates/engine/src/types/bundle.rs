//! FHIR Bundle wire types.
//!
//! Serializes to the FHIR JSON shape: `resourceType, id, type, timestamp,
//! total, link[], entry[].fullUrl/resource/search/request/response`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::outcome::OperationOutcome;

/// Extension URL carrying non-fatal search warnings on a searchset Bundle.
pub const SEARCH_WARNING_EXTENSION: &str =
    "https://helios-software.com/fhir/StructureDefinition/search-warning";

/// Bundle type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    /// Search results.
    Searchset,
    /// Atomic write request.
    Transaction,
    /// Response to a transaction.
    TransactionResponse,
    /// Independent write requests.
    Batch,
    /// Response to a batch.
    BatchResponse,
}

impl BundleType {
    /// Returns the FHIR code.
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Searchset => "searchset",
            BundleType::Transaction => "transaction",
            BundleType::TransactionResponse => "transaction-response",
            BundleType::Batch => "batch",
            BundleType::BatchResponse => "batch-response",
        }
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A FHIR Bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType", rename = "Bundle", rename_all = "camelCase")]
pub struct Bundle {
    /// Logical id of this bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Bundle type.
    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    /// When the bundle was assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Total number of matches (searchset only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Navigation links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,

    /// Entries in the bundle.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,

    /// Bundle-level extensions (search warnings).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl Bundle {
    /// Creates an empty bundle of the given type with a fresh id and timestamp.
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            bundle_type,
            timestamp: Some(format_instant(Utc::now())),
            total: None,
            link: Vec::new(),
            entry: Vec::new(),
            extension: Vec::new(),
        }
    }

    /// Returns the URL of the link with the given relation.
    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }

    /// Returns the warning outcomes attached as extensions.
    pub fn warnings(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.extension
            .iter()
            .filter(|e| e.url == SEARCH_WARNING_EXTENSION)
            .map(|e| &e.value_resource)
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Formats an instant the way FHIR `instant` values are written.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A bundle link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLink {
    /// Link relation (self, next, previous).
    pub relation: String,
    /// Link URL.
    pub url: String,
}

impl BundleLink {
    /// Creates a new link.
    pub fn new(relation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            url: url.into(),
        }
    }
}

/// A bundle entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    /// Absolute URL of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    /// The resource body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    /// Search metadata (searchset only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<EntrySearch>,

    /// Request metadata (transaction/batch only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<EntryRequest>,

    /// Response metadata (transaction-response/batch-response only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<EntryResponse>,
}

/// Why an entry is in a searchset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// Matched the search criteria.
    Match,
    /// Added by `_include`/`_revinclude`.
    Include,
}

/// Search metadata on an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySearch {
    /// The search mode.
    pub mode: SearchEntryMode,
}

/// HTTP verbs allowed in transaction and batch entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Update or create at a known id.
    Put,
    /// Delete.
    Delete,
}

impl HttpVerb {
    /// Parses an upper-case verb.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(HttpVerb::Get),
            "POST" => Some(HttpVerb::Post),
            "PUT" => Some(HttpVerb::Put),
            "DELETE" => Some(HttpVerb::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVerb::Get => write!(f, "GET"),
            HttpVerb::Post => write!(f, "POST"),
            HttpVerb::Put => write!(f, "PUT"),
            HttpVerb::Delete => write!(f, "DELETE"),
        }
    }
}

/// Request metadata on an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRequest {
    /// The HTTP verb.
    pub method: HttpVerb,
    /// The request URL relative to the base.
    pub url: String,
}

/// Response metadata on an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    /// Status line, e.g. `201 Created`.
    pub status: String,

    /// Location of the written resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// ETag of the written resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// When the resource was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// Issues for failed entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OperationOutcome>,
}

impl EntryResponse {
    /// Creates a response with the given status code.
    pub fn status(code: u16) -> Self {
        Self {
            status: status_line(code),
            location: None,
            etag: None,
            last_modified: None,
            outcome: None,
        }
    }

    /// Returns the numeric status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status.split_whitespace().next()?.parse().ok()
    }
}

/// A Bundle-level extension carrying an OperationOutcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Extension URL.
    pub url: String,
    /// The embedded outcome.
    pub value_resource: OperationOutcome,
}

/// Returns the status line for an HTTP status code.
pub fn status_line(code: u16) -> String {
    let text = match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        412 => "Precondition Failed",
        422 => "Unprocessable Entity",
        424 => "Failed Dependency",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    format!("{} {}", code, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_wire_shape() {
        let mut bundle = Bundle::new(BundleType::Searchset);
        bundle.id = Some("b1".to_string());
        bundle.timestamp = None;
        bundle.total = Some(1);
        bundle
            .link
            .push(BundleLink::new("self", "http://x/Patient?name=a"));
        bundle.entry.push(BundleEntry {
            full_url: Some("http://x/Patient/1".to_string()),
            resource: Some(json!({"resourceType": "Patient", "id": "1"})),
            search: Some(EntrySearch {
                mode: SearchEntryMode::Match,
            }),
            ..Default::default()
        });

        assert_eq!(
            bundle.to_json(),
            json!({
                "resourceType": "Bundle",
                "id": "b1",
                "type": "searchset",
                "total": 1,
                "link": [{"relation": "self", "url": "http://x/Patient?name=a"}],
                "entry": [{
                    "fullUrl": "http://x/Patient/1",
                    "resource": {"resourceType": "Patient", "id": "1"},
                    "search": {"mode": "match"}
                }]
            })
        );
        assert_eq!(bundle.link_url("self"), Some("http://x/Patient?name=a"));
        assert_eq!(bundle.link_url("next"), None);
    }

    #[test]
    fn test_response_entry_shape() {
        let mut response = EntryResponse::status(201);
        response.location = Some("Patient/1/_history/1".to_string());
        let entry = BundleEntry {
            response: Some(response),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"response": {"status": "201 Created", "location": "Patient/1/_history/1"}})
        );
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(204), "204 No Content");
        assert_eq!(status_line(424), "424 Failed Dependency");
        assert_eq!(EntryResponse::status(409).status_code(), Some(409));
    }

    #[test]
    fn test_response_bundle_type_codes() {
        assert_eq!(
            serde_json::to_value(BundleType::TransactionResponse).unwrap(),
            json!("transaction-response")
        );
        assert_eq!(BundleType::BatchResponse.to_string(), "batch-response");
    }
}
