//! Resource subsetting for `_summary` and `_elements`.
//!
//! Projection always works on a copy; stored bodies are never modified.
//! Every projected resource is marked with the `SUBSETTED` meta tag.
//!
//! See: https://hl7.org/fhir/search.html#summary

use serde_json::{Map, Value, json};

use crate::types::SummaryMode;

/// System of the `SUBSETTED` tag.
pub const SUBSETTED_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationValue";

/// Elements kept by every projection.
const ALWAYS_INCLUDED: &[&str] = &["resourceType", "id", "meta"];

/// What to keep of each entry resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    summary: Option<SummaryMode>,
    elements: Vec<String>,
}

impl Projection {
    /// Builds a projection from `_summary` and `_elements`. `_elements` wins
    /// when both are present.
    pub fn new(summary: Option<SummaryMode>, elements: Vec<String>) -> Self {
        Self { summary, elements }
    }

    /// Returns true if resources pass through untouched.
    pub fn is_identity(&self) -> bool {
        self.elements.is_empty() && matches!(self.summary, None | Some(SummaryMode::False))
    }

    /// Applies the projection to a copy of `resource`.
    pub fn apply(&self, resource: &Value) -> Value {
        if self.is_identity() {
            return resource.clone();
        }
        let projected = if !self.elements.is_empty() {
            let elements: Vec<&str> = self.elements.iter().map(String::as_str).collect();
            apply_elements(resource, &elements)
        } else {
            match self.summary {
                Some(mode) => apply_summary(resource, mode),
                None => resource.clone(),
            }
        };
        mark_subsetted(projected)
    }
}

/// Summary elements per resource type: the elements FHIR flags `isSummary`.
fn summary_elements(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "Patient" => &[
            "identifier",
            "active",
            "name",
            "telecom",
            "gender",
            "birthDate",
            "deceased",
            "address",
            "managingOrganization",
            "link",
        ],
        "Observation" => &[
            "identifier",
            "status",
            "category",
            "code",
            "subject",
            "encounter",
            "effective",
            "issued",
            "value",
            "dataAbsentReason",
            "interpretation",
            "hasMember",
            "component",
        ],
        "Condition" => &[
            "identifier",
            "clinicalStatus",
            "verificationStatus",
            "category",
            "severity",
            "code",
            "bodySite",
            "subject",
            "encounter",
            "onset",
            "abatement",
            "recordedDate",
        ],
        "Encounter" => &[
            "identifier",
            "status",
            "class",
            "type",
            "serviceType",
            "subject",
            "participant",
            "period",
            "serviceProvider",
        ],
        "Procedure" => &[
            "identifier",
            "status",
            "code",
            "subject",
            "encounter",
            "performed",
            "performer",
        ],
        "MedicationRequest" => &[
            "identifier",
            "status",
            "intent",
            "medication",
            "subject",
            "encounter",
            "authoredOn",
            "requester",
        ],
        "DiagnosticReport" => &[
            "identifier",
            "status",
            "category",
            "code",
            "subject",
            "encounter",
            "effective",
            "issued",
            "performer",
            "result",
            "conclusion",
        ],
        "Practitioner" => &[
            "identifier",
            "active",
            "name",
            "telecom",
            "address",
            "gender",
            "birthDate",
        ],
        "Organization" => &["identifier", "active", "type", "name", "alias", "telecom", "address"],
        _ => &["identifier", "status", "name", "code", "subject", "patient"],
    }
}

/// Top-level elements with minimum cardinality 1.
fn mandatory_elements(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "Observation" | "DiagnosticReport" => &["status", "code"],
        "Encounter" => &["status", "class"],
        "Condition" | "Procedure" => &["subject"],
        "MedicationRequest" => &["status", "intent", "medication", "subject"],
        "RiskAssessment" => &["status", "subject"],
        _ => &[],
    }
}

/// Applies `_summary` to a resource. `Count` keeps only the always-included
/// elements; searches in count mode never reach projection.
pub fn apply_summary(resource: &Value, mode: SummaryMode) -> Value {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match mode {
        SummaryMode::False => resource.clone(),
        SummaryMode::Count => filter_resource(resource, ALWAYS_INCLUDED),
        SummaryMode::Text => {
            let mut keep: Vec<&str> = ALWAYS_INCLUDED.to_vec();
            keep.push("text");
            keep.extend(mandatory_elements(resource_type));
            filter_resource(resource, &keep)
        }
        SummaryMode::Data => exclude_elements(resource, &["text"]),
        SummaryMode::True => {
            let mut keep: Vec<&str> = ALWAYS_INCLUDED.to_vec();
            keep.extend(summary_elements(resource_type));
            filter_resource(resource, &keep)
        }
    }
}

/// Applies `_elements` to a resource.
///
/// Elements name top-level members. A choice-type base name (`value`) keeps
/// whichever typed member is present (`valueQuantity`, `valueString`, ...).
pub fn apply_elements(resource: &Value, elements: &[&str]) -> Value {
    if elements.is_empty() {
        return resource.clone();
    }
    let mut keep: Vec<&str> = ALWAYS_INCLUDED.to_vec();
    for element in elements {
        if !keep.contains(element) {
            keep.push(element);
        }
    }
    filter_resource(resource, &keep)
}

/// Keeps only the listed top-level members.
fn filter_resource(resource: &Value, elements: &[&str]) -> Value {
    let Value::Object(obj) = resource else {
        return resource.clone();
    };
    let result: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| elements.iter().any(|e| element_matches(e, key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(result)
}

/// True if `key` is `element` itself or a choice-type variant of it.
fn element_matches(element: &str, key: &str) -> bool {
    match key.strip_prefix(element) {
        Some("") => true,
        Some(rest) => rest.starts_with(|c: char| c.is_ascii_uppercase()),
        None => false,
    }
}

fn exclude_elements(resource: &Value, elements: &[&str]) -> Value {
    let Value::Object(obj) = resource else {
        return resource.clone();
    };
    let result: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !elements.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(result)
}

/// Adds the `SUBSETTED` tag to `meta.tag` unless it is already there.
fn mark_subsetted(mut resource: Value) -> Value {
    let Value::Object(obj) = &mut resource else {
        return resource;
    };
    let meta = obj
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(meta) = meta else {
        return resource;
    };
    let tags = meta
        .entry("tag")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(tags) = tags {
        let present = tags
            .iter()
            .any(|t| t.get("code").and_then(Value::as_str) == Some("SUBSETTED"));
        if !present {
            tags.push(json!({"system": SUBSETTED_SYSTEM, "code": "SUBSETTED"}));
        }
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "123",
            "meta": {"versionId": "1"},
            "text": {"status": "generated", "div": "<div>Patient</div>"},
            "name": [{"family": "Smith", "given": ["John"]}],
            "birthDate": "1990-01-01",
            "gender": "male",
            "communication": [{"language": {"text": "English"}}],
            "photo": [{"data": "aGVsbG8="}]
        })
    }

    fn has_subsetted_tag(resource: &Value) -> bool {
        resource["meta"]["tag"]
            .as_array()
            .is_some_and(|tags| tags.iter().any(|t| t["code"] == "SUBSETTED"))
    }

    #[test]
    fn test_identity_projection_is_untouched() {
        let projection = Projection::new(Some(SummaryMode::False), Vec::new());
        assert!(projection.is_identity());
        assert_eq!(projection.apply(&patient()), patient());
    }

    #[test]
    fn test_summary_text() {
        let result = apply_summary(&patient(), SummaryMode::Text);
        assert!(result.get("text").is_some());
        assert!(result.get("meta").is_some());
        assert!(result.get("name").is_none());
        assert!(result.get("birthDate").is_none());
    }

    #[test]
    fn test_summary_text_keeps_mandatory_elements() {
        let observation = json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "code": {"text": "BP"},
            "text": {"div": "<div/>"},
            "note": [{"text": "n"}]
        });
        let result = apply_summary(&observation, SummaryMode::Text);
        assert_eq!(result["status"], "final");
        assert!(result.get("code").is_some());
        assert!(result.get("note").is_none());
    }

    #[test]
    fn test_summary_data_drops_text() {
        let result = apply_summary(&patient(), SummaryMode::Data);
        assert!(result.get("text").is_none());
        assert!(result.get("name").is_some());
        assert!(result.get("photo").is_some());
    }

    #[test]
    fn test_summary_true_patient() {
        let result = apply_summary(&patient(), SummaryMode::True);
        assert!(result.get("name").is_some());
        assert!(result.get("birthDate").is_some());
        assert!(result.get("communication").is_none());
        assert!(result.get("photo").is_none());
    }

    #[test]
    fn test_elements_keep_listed_and_mandatory() {
        let result = apply_elements(&patient(), &["name", "birthDate"]);
        let mut keys: Vec<&str> = result.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["birthDate", "id", "meta", "name", "resourceType"]);
    }

    #[test]
    fn test_elements_are_choice_type_aware() {
        let observation = json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "valueQuantity": {"value": 120, "unit": "mmHg"}
        });
        let result = apply_elements(&observation, &["value"]);
        assert!(result.get("valueQuantity").is_some());
        assert!(result.get("status").is_none());
        // lowercase continuation is a different element
        assert!(!element_matches("value", "valueset"));
    }

    #[test]
    fn test_projection_marks_subsetted_once() {
        let projection = Projection::new(None, vec!["gender".to_string()]);
        let once = projection.apply(&patient());
        assert!(has_subsetted_tag(&once));
        assert_eq!(once["meta"]["versionId"], "1");

        let twice = projection.apply(&once);
        assert_eq!(twice["meta"]["tag"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_elements_win_over_summary() {
        let projection = Projection::new(Some(SummaryMode::Text), vec!["gender".to_string()]);
        let result = projection.apply(&patient());
        assert!(result.get("gender").is_some());
        assert!(result.get("text").is_none());
    }
}
