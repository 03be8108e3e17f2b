//! Error types for the engine.
//!
//! Errors are grouped the way callers handle them: parameter validation
//! problems (always enumerated, never fail-fast), storage collaborator
//! failures, search execution failures, and fatal transaction-bundle errors.
//! Each maps to an [`ErrorCode`], an HTTP status, and an OperationOutcome.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::types::{Issue, IssueType, OperationOutcome};

/// The engine's error taxonomy as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationError,
    ChainTooDeep,
    CircularReference,
    StorageUnavailable,
    PartialIncludeFailure,
    EntryFailed,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ChainTooDeep => "CHAIN_TOO_DEEP",
            ErrorCode::CircularReference => "CIRCULAR_REFERENCE",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::PartialIncludeFailure => "PARTIAL_INCLUDE_FAILURE",
            ErrorCode::EntryFailed => "ENTRY_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The top-level error type.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Parameter validation errors
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Search execution errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Fatal transaction/batch errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Storage collaborator errors
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Returns the taxonomy code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(e) => e.code(),
            EngineError::Search(e) => e.code(),
            EngineError::Transaction(e) => e.code(),
            EngineError::Storage(e) => e.code(),
        }
    }

    /// Returns the HTTP status a front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::Search(e) => e.http_status(),
            EngineError::Transaction(e) => e.http_status(),
            EngineError::Storage(e) => e.http_status(),
        }
    }

    /// Renders the error as an OperationOutcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        match self {
            EngineError::Validation(e) => e.to_operation_outcome(),
            EngineError::Search(e) => e.to_operation_outcome(),
            EngineError::Transaction(e) => e.to_operation_outcome(),
            EngineError::Storage(e) => OperationOutcome::single(e.to_issue()),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Specific reason a search parameter was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    UnknownParameter,
    UnsupportedModifier,
    UnsupportedPrefix,
    FormatInvalid,
    ParameterConflict,
    ChainTooDeep,
}

impl ValidationCode {
    /// Returns the wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::UnknownParameter => "UNKNOWN_PARAMETER",
            ValidationCode::UnsupportedModifier => "UNSUPPORTED_MODIFIER",
            ValidationCode::UnsupportedPrefix => "UNSUPPORTED_PREFIX",
            ValidationCode::FormatInvalid => "FORMAT_INVALID",
            ValidationCode::ParameterConflict => "PARAMETER_CONFLICT",
            ValidationCode::ChainTooDeep => "CHAIN_TOO_DEEP",
        }
    }

    fn issue_type(&self) -> IssueType {
        match self {
            ValidationCode::UnknownParameter
            | ValidationCode::UnsupportedModifier
            | ValidationCode::UnsupportedPrefix => IssueType::NotSupported,
            ValidationCode::FormatInvalid => IssueType::Value,
            ValidationCode::ParameterConflict => IssueType::Invalid,
            ValidationCode::ChainTooDeep => IssueType::TooCostly,
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One problem found while validating search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    /// The query-string key the problem belongs to.
    pub parameter: String,
    pub message: String,
}

impl ValidationIssue {
    /// Converts to an OperationOutcome issue.
    pub fn to_issue(&self) -> Issue {
        Issue::error(
            self.code.issue_type(),
            format!("[{}] {}", self.code, self.message),
        )
        .with_expression(&self.parameter)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.parameter, self.message)
    }
}

/// Every problem found in one set of search parameters.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("search parameters rejected: {}", summarize(.issues))]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem.
    pub fn push(
        &mut self,
        code: ValidationCode,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(ValidationIssue {
            code,
            parameter: parameter.into(),
            message: message.into(),
        });
    }

    /// Moves all problems from `other` into `self`.
    pub fn extend(&mut self, other: ValidationErrors) {
        self.issues.extend(other.issues);
    }

    /// Returns the recorded problems.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns the number of problems.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns true if any problem has the given code.
    pub fn contains(&self, code: ValidationCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    /// Returns `Ok(value)` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }

    /// Chain-depth violations are reported under their own taxonomy code.
    pub fn code(&self) -> ErrorCode {
        if !self.is_empty()
            && self
                .issues
                .iter()
                .all(|i| i.code == ValidationCode::ChainTooDeep)
        {
            ErrorCode::ChainTooDeep
        } else {
            ErrorCode::ValidationError
        }
    }

    /// Renders all problems as one OperationOutcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        OperationOutcome::new(self.issues.iter().map(ValidationIssue::to_issue).collect())
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Errors reported by the storage collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("conflict on {resource_type}/{id}: {message}")]
    Conflict {
        resource_type: String,
        id: String,
        message: String,
    },

    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

impl StorageError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        StorageError::Unavailable {
            message: message.into(),
        }
    }

    /// Returns the taxonomy code.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::Unavailable { .. } => ErrorCode::StorageUnavailable,
            _ => ErrorCode::EntryFailed,
        }
    }

    /// Returns true if the caller may retry the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }

    /// Returns the HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            StorageError::NotFound { .. } => 404,
            StorageError::Conflict { .. } => 409,
            StorageError::Unavailable { .. } => 500,
            StorageError::InvalidDocument { .. } => 400,
        }
    }

    /// Converts to an OperationOutcome issue.
    pub fn to_issue(&self) -> Issue {
        let code = match self {
            StorageError::NotFound { .. } => IssueType::NotFound,
            StorageError::Conflict { .. } => IssueType::Conflict,
            StorageError::Unavailable { .. } => IssueType::Transient,
            StorageError::InvalidDocument { .. } => IssueType::Invalid,
        };
        Issue::error(code, self.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::InvalidDocument {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Search execution
// ============================================================================

/// Errors that abort a search request.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("search cancelled")]
    Cancelled,

    #[error("search task failed: {message}")]
    TaskFailed { message: String },
}

impl SearchError {
    /// Returns the taxonomy code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SearchError::Validation(e) => e.code(),
            SearchError::Storage(_)
            | SearchError::Timeout { .. }
            | SearchError::Cancelled
            | SearchError::TaskFailed { .. } => ErrorCode::StorageUnavailable,
        }
    }

    /// Returns the HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SearchError::Validation(_) => 400,
            SearchError::Storage(e) => e.http_status(),
            SearchError::Timeout { .. }
            | SearchError::Cancelled
            | SearchError::TaskFailed { .. } => 500,
        }
    }

    /// Renders the error as an OperationOutcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        match self {
            SearchError::Validation(e) => e.to_operation_outcome(),
            SearchError::Storage(e) => OperationOutcome::single(e.to_issue()),
            SearchError::Timeout { .. } => {
                OperationOutcome::single(Issue::error(IssueType::Timeout, self.to_string()))
            }
            SearchError::Cancelled | SearchError::TaskFailed { .. } => {
                OperationOutcome::single(Issue::error(IssueType::Exception, self.to_string()))
            }
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Errors that reject a whole transaction or batch Bundle before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid bundle: {message}")]
    InvalidBundle { message: String },

    #[error("circular reference between bundle entries: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    #[error("entry {index} references {reference}, which no entry in the bundle declares")]
    UnresolvedReference { index: usize, reference: String },
}

impl TransactionError {
    /// Creates an invalid-bundle error.
    pub fn invalid(message: impl Into<String>) -> Self {
        TransactionError::InvalidBundle {
            message: message.into(),
        }
    }

    /// Returns the taxonomy code.
    pub fn code(&self) -> ErrorCode {
        match self {
            TransactionError::CircularReference { .. } => ErrorCode::CircularReference,
            TransactionError::InvalidBundle { .. }
            | TransactionError::UnresolvedReference { .. } => ErrorCode::ValidationError,
        }
    }

    /// Returns the HTTP status for this error.
    pub fn http_status(&self) -> u16 {
        400
    }

    /// Renders the error as an OperationOutcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let code = match self {
            TransactionError::InvalidBundle { .. } => IssueType::Structure,
            TransactionError::CircularReference { .. } => IssueType::Processing,
            TransactionError::UnresolvedReference { .. } => IssueType::NotFound,
        };
        OperationOutcome::single(Issue::error(
            code,
            format!("[{}] {}", self.code(), self),
        ))
    }
}

/// Result type for storage collaborator calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for transaction processing.
pub type TransactionResult<T> = Result<T, TransactionError>;
