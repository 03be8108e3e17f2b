//! FHIR search.
//!
//! A search request flows through these stages:
//!
//! - [`RawParams`] - query string split into key occurrences and OR values
//! - [`ParameterValidator`] - binds parameters to the catalog, parses values,
//!   and reports every problem at once
//! - [`QueryTranslator`] - builds the [`QueryPlan`] for the hybrid index
//! - [`SearchService`] - resolves chains through a bounded [`FanOut`],
//!   executes the plan, fetches bodies and includes, and assembles the
//!   searchset [`Bundle`](crate::types::Bundle)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use helios_engine::EngineConfig;
//! use helios_engine::backends::memory::MemoryStore;
//! use helios_engine::catalog::ParameterCatalog;
//! use helios_engine::search::{CancellationToken, RawParams, SearchService};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.insert_json(json!({"resourceType": "Patient", "id": "p1", "gender": "female"})).unwrap();
//!
//! let catalog = Arc::new(ParameterCatalog::builtin().unwrap());
//! let service = SearchService::new(EngineConfig::for_testing(), catalog, store);
//!
//! let raw = RawParams::parse_query("gender=female");
//! let bundle = service.search("Patient", &raw, CancellationToken::new()).await.unwrap();
//! assert_eq!(bundle.total, Some(1));
//! # });
//! ```

mod assembler;
mod constraint;
mod fanout;
mod include;
mod plan;
mod projection;
mod raw;
mod service;
mod translator;
mod validator;
mod values;

pub use assembler::{AssemblyRequest, assemble};
pub use constraint::{
    ChainDirection, ChainLink, ParsedConstraint, ResultParameters, ValidatedSearch,
};
pub use fanout::{CancellationToken, FanOut};
pub use include::{IncludeResolution, IncludeResolver};
pub use plan::{
    ChainedSubPlan, Combinator, ComponentTest, FtsClause, FtsMode, Predicate, PredicateTest,
    QueryPlan, RangeValue, SortKey,
};
pub use projection::{Projection, SUBSETTED_SYSTEM, apply_elements, apply_summary};
pub use raw::{RawParameter, RawParams};
pub use service::SearchService;
pub use translator::QueryTranslator;
pub use validator::{ParameterValidator, ValidationPolicy};
pub use values::{
    ConstraintValue, DatePrecision, DateRange, NumberValue, ReferenceValue, TokenSystem,
    TypedValue,
};
