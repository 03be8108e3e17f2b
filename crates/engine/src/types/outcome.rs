//! OperationOutcome wire types.
//!
//! Every failure the engine reports leaves as an OperationOutcome with one
//! issue per problem (`issue[].severity/code/diagnostics`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Fatal error - processing cannot continue.
    Fatal,
    /// Error - processing has failed.
    Error,
    /// Warning - processing succeeded but with concerns.
    Warning,
    /// Information - informational message.
    Information,
}

impl IssueSeverity {
    /// Returns the FHIR string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Fatal => "fatal",
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }
}

/// Issue type codes used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    /// Invalid content.
    Invalid,
    /// Structural issue.
    Structure,
    /// Value out of range or malformed.
    Value,
    /// Resource not found.
    NotFound,
    /// Conflict with existing state.
    Conflict,
    /// Not supported.
    NotSupported,
    /// The request would be too expensive to run.
    TooCostly,
    /// Processing error.
    Processing,
    /// The result is incomplete.
    Incomplete,
    /// Transient error, the caller may retry.
    Transient,
    /// Request timed out.
    Timeout,
    /// Unexpected internal error.
    Exception,
    /// Informational message.
    Informational,
}

impl IssueType {
    /// Returns the FHIR code string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Invalid => "invalid",
            IssueType::Structure => "structure",
            IssueType::Value => "value",
            IssueType::NotFound => "not-found",
            IssueType::Conflict => "conflict",
            IssueType::NotSupported => "not-supported",
            IssueType::TooCostly => "too-costly",
            IssueType::Processing => "processing",
            IssueType::Incomplete => "incomplete",
            IssueType::Transient => "transient",
            IssueType::Timeout => "timeout",
            IssueType::Exception => "exception",
            IssueType::Informational => "informational",
        }
    }
}

/// An issue in an OperationOutcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// The severity of the issue.
    pub severity: IssueSeverity,
    /// The type/code of the issue.
    pub code: IssueType,
    /// Human-readable description.
    pub diagnostics: String,
    /// Location of the problem (search parameter name or FHIRPath).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
}

impl Issue {
    /// Creates a new issue.
    pub fn new(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            diagnostics: diagnostics.into(),
            expression: Vec::new(),
        }
    }

    /// Creates an error issue.
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, diagnostics)
    }

    /// Creates a warning issue.
    pub fn warning(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, diagnostics)
    }

    /// Creates an information issue.
    pub fn information(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Information, code, diagnostics)
    }

    /// Adds an expression (location).
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression.push(expression.into());
        self
    }
}

/// The OperationOutcome resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType", rename = "OperationOutcome")]
pub struct OperationOutcome {
    /// The issues, in the order they were found.
    pub issue: Vec<Issue>,
}

impl OperationOutcome {
    /// Creates an outcome from a list of issues.
    pub fn new(issue: Vec<Issue>) -> Self {
        Self { issue }
    }

    /// Creates an outcome with a single issue.
    pub fn single(issue: Issue) -> Self {
        Self { issue: vec![issue] }
    }

    /// Returns true if any issue is an error or fatal.
    pub fn has_errors(&self) -> bool {
        self.issue
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal))
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Builder for OperationOutcome resources.
#[derive(Debug, Default)]
pub struct OperationOutcomeBuilder {
    issues: Vec<Issue>,
}

impl OperationOutcomeBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue.
    pub fn add_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Adds an error issue.
    pub fn error(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::error(code, diagnostics))
    }

    /// Adds a warning issue.
    pub fn warning(self, code: IssueType, diagnostics: impl Into<String>) -> Self {
        self.add_issue(Issue::warning(code, diagnostics))
    }

    /// Builds the OperationOutcome resource.
    pub fn build(self) -> OperationOutcome {
        OperationOutcome::new(self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = OperationOutcomeBuilder::new()
            .add_issue(
                Issue::error(IssueType::NotSupported, "unknown parameter").with_expression("foo"),
            )
            .warning(IssueType::Processing, "partial")
            .build();

        assert_eq!(
            outcome.to_json(),
            json!({
                "resourceType": "OperationOutcome",
                "issue": [
                    {
                        "severity": "error",
                        "code": "not-supported",
                        "diagnostics": "unknown parameter",
                        "expression": ["foo"]
                    },
                    {
                        "severity": "warning",
                        "code": "processing",
                        "diagnostics": "partial"
                    }
                ]
            })
        );
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_outcome_round_trips_from_json() {
        let value = json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "warning", "code": "too-costly", "diagnostics": "x"}]
        });
        let outcome: OperationOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(outcome.issue[0].code, IssueType::TooCostly);
        assert!(!outcome.has_errors());
    }
}
