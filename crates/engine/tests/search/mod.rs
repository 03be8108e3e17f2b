//! Search tests.
//!
//! Parameter validation, composite and date semantics, result projection,
//! includes, and cursor pagination.

pub mod composite_tests;
pub mod date_tests;
pub mod include_tests;
pub mod pagination_tests;
pub mod projection_tests;
pub mod validation_tests;
