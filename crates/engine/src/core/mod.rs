//! Collaborator interfaces the engine depends on.
//!
//! - [`StorageQuery`] - executes query plans against the hybrid index
//! - [`StorageCrud`] - single-document create/read/update/delete
//! - [`ProfileValidator`] - external profile validation for write paths
//!
//! ```text
//! SearchService ──► StorageQuery ──► structured index + full-text index
//! TransactionProcessor ──► StorageCrud
//!                      └─► ProfileValidator
//! ```
//!
//! [`MemoryStore`](crate::backends::memory::MemoryStore) implements both
//! storage traits in process.

mod path;
mod storage;
mod validator;

pub use path::values_at;
pub use storage::{DocumentSet, SearchResult, StorageCrud, StorageQuery};
pub use validator::{NoopProfileValidator, ProfileValidation, ProfileValidator};
