//! Profile validation collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{Issue, IssueSeverity, OperationOutcome};

/// Result of validating a resource body against its profiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileValidation {
    /// Every issue reported by the validator.
    pub issues: Vec<Issue>,
}

impl ProfileValidation {
    /// A result with no issues.
    pub fn valid() -> Self {
        Self::default()
    }

    /// A result carrying the given issues.
    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// True when no issue is an error.
    pub fn is_valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::Fatal))
    }

    /// Renders the issues as an OperationOutcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        OperationOutcome::new(self.issues.clone())
    }
}

/// External FHIR profile validator. Called for create and update bodies only.
#[async_trait]
pub trait ProfileValidator: Send + Sync {
    /// Validates a resource body.
    async fn validate_profile(&self, resource_type: &str, document: &Value) -> ProfileValidation;
}

/// Accepts every resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProfileValidator;

#[async_trait]
impl ProfileValidator for NoopProfileValidator {
    async fn validate_profile(&self, _resource_type: &str, _document: &Value) -> ProfileValidation {
        ProfileValidation::valid()
    }
}
