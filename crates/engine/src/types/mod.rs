//! Core types shared by the search and transaction halves of the engine.
//!
//! - [`SearchParamType`], [`SearchModifier`], [`SearchPrefix`] - search vocabulary
//! - [`PageRequest`], [`PageCursor`], [`PageInfo`] - pagination
//! - [`ResourceRef`], [`StoredDocument`], [`WriteOutcome`] - resource identity
//! - [`Bundle`], [`OperationOutcome`] - FHIR wire types
//!
//! # Examples
//!
//! ```
//! use helios_engine::types::{PageCursor, CursorValue, ResourceRef};
//!
//! let cursor = PageCursor::new(vec![CursorValue::from("2024-05-01")], "obs-9");
//! let token = cursor.encode();
//! assert_eq!(PageCursor::decode(&token).unwrap().resource_id(), "obs-9");
//!
//! let patient = ResourceRef::parse("Patient/123").unwrap();
//! assert_eq!(patient.to_string(), "Patient/123");
//! ```

mod bundle;
mod outcome;
mod pagination;
mod resource;
mod search_params;

pub use bundle::{
    Bundle, BundleEntry, BundleLink, BundleType, EntryRequest, EntryResponse, EntrySearch,
    Extension, HttpVerb, SEARCH_WARNING_EXTENSION, SearchEntryMode, format_instant, status_line,
};
pub use outcome::{Issue, IssueSeverity, IssueType, OperationOutcome, OperationOutcomeBuilder};
pub use pagination::{
    CursorDirection, CursorValue, InvalidCursor, PageCursor, PageInfo, PageRequest,
};
pub use resource::{ResourceRef, StoredDocument, WriteOutcome, is_logical_id, is_resource_type};
pub use search_params::{
    IncludeDirective, IncludeType, SearchModifier, SearchParamType, SearchPrefix, SortDirection,
    SortDirective, SummaryMode, TotalMode,
};
