//! Resource identity and stored document types.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static RESOURCE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z]{1,63}$").expect("static regex"));

static LOGICAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("static regex"));

/// Returns true if `s` is shaped like a FHIR resource type name.
pub fn is_resource_type(s: &str) -> bool {
    RESOURCE_TYPE.is_match(s)
}

/// Returns true if `s` is a valid FHIR logical id.
pub fn is_logical_id(s: &str) -> bool {
    LOGICAL_ID.is_match(s)
}

/// A `Type/id` pointer to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    /// The FHIR resource type.
    pub resource_type: String,
    /// The logical id.
    pub id: String,
}

impl ResourceRef {
    /// Creates a new reference.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parses a literal reference.
    ///
    /// Accepts `Type/id`, `Type/id/_history/v`, and absolute URLs ending in
    /// either form. Returns `None` for contained (`#x`), `urn:` and malformed
    /// references.
    pub fn parse(reference: &str) -> Option<Self> {
        if reference.starts_with('#') || reference.starts_with("urn:") {
            return None;
        }
        let path = reference.split(['?', '#']).next().unwrap_or(reference);
        let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        let tail = match segments.iter().rposition(|s| *s == "_history") {
            Some(pos) => &segments[..pos],
            None => &segments[..],
        };
        if tail.len() < 2 {
            return None;
        }
        let resource_type = tail[tail.len() - 2];
        let id = tail[tail.len() - 1];
        if tail.len() > 2 && !reference.contains("://") {
            return None;
        }
        (is_resource_type(resource_type) && is_logical_id(id))
            .then(|| Self::new(resource_type, id))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// A resource body as held by the document store, with its persistence metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    resource_type: String,
    id: String,
    version_id: String,
    last_updated: DateTime<Utc>,
    content: Value,
}

impl StoredDocument {
    /// Creates a stored document. `content` should already carry `id` and `meta`.
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version_id: impl Into<String>,
        last_updated: DateTime<Utc>,
        content: Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: version_id.into(),
            last_updated,
            content,
        }
    }

    /// Returns the resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the logical id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version id.
    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    /// Returns the last-updated instant.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Returns the resource JSON.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Consumes the document, returning the resource JSON.
    pub fn into_content(self) -> Value {
        self.content
    }

    /// Returns the `Type/id` reference to this document.
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.resource_type, &self.id)
    }

    /// Returns the weak ETag for this version.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }
}

/// Result of a successful write against the CRUD collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// The logical id that was written.
    pub id: String,
    /// The new version id.
    pub version_id: String,
    /// When the write happened.
    pub last_updated: DateTime<Utc>,
    /// True when the write created the resource (create, or update-as-create).
    pub created: bool,
}

impl WriteOutcome {
    /// Returns `Type/id/_history/vid` for use as a response `location`.
    pub fn location(&self, resource_type: &str) -> String {
        format!("{}/{}/_history/{}", resource_type, self.id, self.version_id)
    }

    /// Returns the weak ETag for the written version.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_reference() {
        assert_eq!(
            ResourceRef::parse("Patient/123"),
            Some(ResourceRef::new("Patient", "123"))
        );
        assert_eq!(
            ResourceRef::parse("Patient/123/_history/4"),
            Some(ResourceRef::new("Patient", "123"))
        );
    }

    #[test]
    fn test_parse_absolute_reference() {
        assert_eq!(
            ResourceRef::parse("https://example.org/fhir/Organization/org-1"),
            Some(ResourceRef::new("Organization", "org-1"))
        );
    }

    #[test]
    fn test_parse_rejects_non_literal_references() {
        assert_eq!(ResourceRef::parse("#contained"), None);
        assert_eq!(ResourceRef::parse("urn:uuid:1234"), None);
        assert_eq!(ResourceRef::parse("123"), None);
        assert_eq!(ResourceRef::parse("patient/123"), None);
        assert_eq!(ResourceRef::parse("a/Patient/123"), None);
        assert_eq!(ResourceRef::parse("Patient/"), None);
    }

    #[test]
    fn test_identity_helpers() {
        assert!(is_resource_type("Observation"));
        assert!(!is_resource_type("observation"));
        assert!(is_logical_id("abc-1.2"));
        assert!(!is_logical_id("has space"));
        assert_eq!(ResourceRef::new("Patient", "1").to_string(), "Patient/1");
    }

    #[test]
    fn test_write_outcome_location() {
        let outcome = WriteOutcome {
            id: "p1".to_string(),
            version_id: "3".to_string(),
            last_updated: Utc::now(),
            created: false,
        };
        assert_eq!(outcome.location("Patient"), "Patient/p1/_history/3");
        assert_eq!(outcome.etag(), "W/\"3\"");
    }
}
