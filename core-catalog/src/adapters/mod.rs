//! Query executor implementations
//!
//! Production hosts inject their own backend client. The in-memory executor
//! serves tests and demos.

pub mod memory;

pub use memory::InMemoryQueryExecutor;
