//! Transaction tests.
//!
//! Reference resolution, ordering, atomic rollback, and batch independence.

pub mod batch_tests;
pub mod bundle_tests;
pub mod rollback_tests;
