//! # Host Bridge Traits
//!
//! Capability traits the host must provide to the catalog core.
//!
//! ## Overview
//!
//! The paginated song catalog is a client-side layer: it decides *what* to
//! fetch and how results accumulate, but the network/storage client that
//! actually runs queries belongs to the host. This crate is the contract
//! between the two.
//!
//! ## Traits
//!
//! - [`QueryExecutor`](query::QueryExecutor) - Runs range-bounded, ordered selects
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert transport or driver errors into it with an actionable message
//! (table, status code, backend error text).
//!
//! ## Thread Safety
//!
//! Bridge traits require `Send + Sync` so one implementation can be shared by
//! every paged list and their background prefetch tasks.
//!
//! ## Examples
//!
//! ### Implementing QueryExecutor
//!
//! ```ignore
//! use bridge_traits::query::{QueryExecutor, RawRow, SelectQuery};
//! use bridge_traits::error::{BridgeError, Result};
//! use async_trait::async_trait;
//!
//! pub struct RestExecutor {
//!     client: reqwest::Client,
//!     base_url: String,
//! }
//!
//! #[async_trait]
//! impl QueryExecutor for RestExecutor {
//!     async fn execute(&self, query: SelectQuery) -> Result<Vec<RawRow>> {
//!         // Translate filters/order/range into PostgREST parameters and
//!         // a `Range` header, then decode the JSON array body.
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod log;
pub mod query;

pub use error::BridgeError;

// Re-export commonly used types
pub use log::{BufferedLogger, LogEntry, LogLevel, LoggerSink};
pub use query::{EqFilter, OrderBy, QueryExecutor, QueryValue, RawRow, RowRange, SelectQuery};
