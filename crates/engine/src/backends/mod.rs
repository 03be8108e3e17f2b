//! Storage backend implementations.
//!
//! The engine talks to storage only through [`StorageQuery`](crate::core::StorageQuery)
//! and [`StorageCrud`](crate::core::StorageCrud). Production deployments
//! implement those traits over their document store; this module ships the
//! in-memory reference backend used by the CLI and the test suites.
//!
//! # Available Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | Memory | Process-local store with fault injection, for development and tests |
//!
//! # Example
//!
//! ```no_run
//! use helios_engine::backends::memory::MemoryStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.load_str(&std::fs::read_to_string("./data/patients.ndjson")?)?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
