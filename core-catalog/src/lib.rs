//! # Song Catalog Module
//!
//! Paginated, cached access to the song collections of a media catalog.
//!
//! ## Overview
//!
//! This module manages:
//! - Normalization of untrusted joined rows into [`Song`] values
//! - Cache keys per collection kind and user scope
//! - Range queries per collection through the host `QueryExecutor`
//! - A paged list per key with accumulated pages, status flags and
//!   next-page prefetching

pub mod adapters;
pub mod cache;
pub mod controller;
pub mod error;
pub mod keys;
pub mod models;
pub mod normalize;
pub mod pagination;
pub mod source;

pub use cache::{ListState, PagedListSnapshot};
pub use controller::{PagedFetchController, PagedList};
pub use error::{CatalogError, Result};
pub use keys::{build_key, CacheKey, CollectionKind, SongCollection};
pub use models::{Album, Artist, Song};
pub use normalize::{normalize, parse_row, RejectReason, RowOutcome};
pub use pagination::{has_more, next_offset, Page, PageRequest};
pub use source::SongSource;
