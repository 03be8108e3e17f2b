//! Helios FHIR Search & Transaction Engine
//!
//! This crate sits in front of a document store with a hybrid index (a
//! structured secondary index plus a full-text index) and provides the two
//! halves of a FHIR server that are hardest to get right:
//!
//! - **Search** - validates FHIR search parameters against a catalog,
//!   translates them into index query plans, resolves chained and `_has`
//!   parameters with bounded concurrent fan-out, follows `_include` /
//!   `_revinclude`, and assembles paginated searchset Bundles
//! - **Transactions** - executes `transaction` and `batch` Bundles with
//!   `urn:uuid:` reference resolution, dependency ordering, and compensation
//!   when a transaction fails part way
//!
//! The store itself is a collaborator: implement [`core::StorageQuery`] and
//! [`core::StorageCrud`] for your backend, or use the in-memory
//! [`backends::memory::MemoryStore`].
//!
//! # Architecture
//!
//! - [`types`] - search vocabulary, pagination, Bundles, OperationOutcomes
//! - [`error`] - error types for all operations
//! - [`config`] - engine limits and defaults
//! - [`catalog`] - supported search parameters per resource type
//! - [`search`] - validation, planning, and execution of searches
//! - [`transaction`] - transaction and batch Bundle processing
//! - [`core`] - collaborator traits
//! - [`backends`] - collaborator implementations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use helios_engine::{EngineConfig, ParameterCatalog, SearchService, TransactionProcessor};
//! use helios_engine::backends::memory::MemoryStore;
//! use helios_engine::search::{CancellationToken, RawParams};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let transactions = TransactionProcessor::new(store.clone());
//! transactions.process(&json!({
//!     "resourceType": "Bundle",
//!     "type": "batch",
//!     "entry": [{
//!         "resource": {"resourceType": "Patient", "gender": "female", "birthDate": "1984-03-02"},
//!         "request": {"method": "POST", "url": "Patient"}
//!     }]
//! })).await.unwrap();
//!
//! let catalog = Arc::new(ParameterCatalog::builtin().unwrap());
//! let search = SearchService::new(EngineConfig::for_testing(), catalog, store);
//! let raw = RawParams::parse_query("birthdate=ge1980&gender=female");
//! let bundle = search.search("Patient", &raw, CancellationToken::new()).await.unwrap();
//! assert_eq!(bundle.total, Some(1));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod search;
pub mod transaction;
pub mod types;

// Re-export commonly used types at crate root
pub use catalog::ParameterCatalog;
pub use config::EngineConfig;
pub use error::{EngineError, SearchError, StorageError, TransactionError, ValidationErrors};
pub use search::SearchService;
pub use transaction::TransactionProcessor;

// Re-export collaborator traits
pub use core::{ProfileValidator, StorageCrud, StorageQuery};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
