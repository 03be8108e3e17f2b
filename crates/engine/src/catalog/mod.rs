//! Search parameter catalog.
//!
//! The catalog answers "which parameters does resource type X support, and
//! how are they typed". It is built once and shared read-only between
//! requests.
//!
//! ```
//! use helios_engine::catalog::ParameterCatalog;
//! use helios_engine::types::SearchParamType;
//!
//! let catalog = ParameterCatalog::builtin().unwrap();
//! let birthdate = catalog.get("Patient", "birthdate").unwrap();
//! assert_eq!(birthdate.param_type, SearchParamType::Date);
//! ```

mod builtin;
mod definition;
mod registry;

pub use definition::ParameterDefinition;
pub use registry::{CatalogBuilder, CatalogError, ParameterCatalog};
