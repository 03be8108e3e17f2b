//! FHIR `transaction` and `batch` Bundle processing.
//!
//! Processing happens in two phases:
//!
//! 1. [`TransactionPlan::build`] parses entries, binds `urn:uuid:`
//!    placeholders, rewrites references, and orders entries so that every
//!    entry runs after the entries whose ids it references. Circular
//!    references and (for transactions) malformed entries are rejected here,
//!    before any write.
//! 2. [`TransactionProcessor`] executes the plan sequentially and builds the
//!    response Bundle. A failed transaction is compensated in reverse order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use helios_engine::backends::memory::MemoryStore;
//! use helios_engine::transaction::TransactionProcessor;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let processor = TransactionProcessor::new(store.clone());
//!
//! let response = processor.process(&json!({
//!     "resourceType": "Bundle",
//!     "type": "transaction",
//!     "entry": [
//!         {"fullUrl": "urn:uuid:61ebe359-bfdc-4613-8bf2-c5e300945f0a",
//!          "resource": {"resourceType": "Patient"},
//!          "request": {"method": "POST", "url": "Patient"}},
//!         {"resource": {"resourceType": "Observation",
//!                       "subject": {"reference": "urn:uuid:61ebe359-bfdc-4613-8bf2-c5e300945f0a"}},
//!          "request": {"method": "POST", "url": "Observation"}}
//!     ]
//! })).await.unwrap();
//!
//! assert_eq!(response.entry.len(), 2);
//! assert_eq!(store.len(), 2);
//! # });
//! ```

mod plan;
mod processor;
mod references;

pub use plan::{
    AppliedChange, EntryOperation, EntryRejection, EntryStatus, PlannedEntry, TransactionKind,
    TransactionPlan,
};
pub use processor::TransactionProcessor;
pub use references::{UrnBindings, is_urn};
