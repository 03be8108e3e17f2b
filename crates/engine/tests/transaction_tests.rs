//! Transaction and batch integration tests against the in-memory store.
//!
//! Run with: `cargo test -p helios-engine --test transaction_tests`

mod common;
mod transactions;
