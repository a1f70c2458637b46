//! Workspace facade crate.
//!
//! Host applications can depend on `catalog-workspace` alone and reach the
//! bridge traits, the runtime helpers, and the song catalog without wiring
//! each member crate individually.

pub use bridge_traits;
pub use core_catalog;
pub use core_runtime;

pub use core_catalog::{
    CacheKey, CollectionKind, PagedFetchController, PagedList, PagedListSnapshot, Song,
    SongCollection,
};
