//! # Catalog Configuration
//!
//! Builder-based configuration for the paginated song catalog.
//!
//! ## Overview
//!
//! [`CatalogConfig`] bundles the host-provided query executor with the paging
//! settings every list opened from it shares. The builder fails fast: a
//! missing executor or an unusable page size is reported at `build()` time
//! with an actionable message rather than on the first fetch.
//!
//! ## Required Dependencies
//!
//! - `QueryExecutor` - Runs range-bounded selects against the backend
//!
//! ## Optional
//!
//! - `EventBus` - Receives page-load, prefetch and failure events
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CatalogConfig;
//! use std::sync::Arc;
//!
//! let config = CatalogConfig::builder()
//!     .query_executor(Arc::new(MyRestExecutor::new(url, anon_key)))
//!     .page_size(20)
//!     .enable_prefetch(true)
//!     .build()?;
//! ```
//!
//! ```should_panic
//! use core_runtime::config::CatalogConfig;
//!
//! // No executor: fails with Error::CapabilityMissing
//! let config = CatalogConfig::builder()
//!     .page_size(20)
//!     .build()
//!     .expect("Should fail - missing query executor");
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::QueryExecutor;
use std::sync::Arc;

/// Page size used when the host does not pick one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a single range request may ask for.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Shared settings for every paged list opened by a controller.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Backend query executor (required)
    pub query_executor: Arc<dyn QueryExecutor>,

    /// Rows requested per page
    pub page_size: usize,

    /// Speculatively fetch the next page after each foreground page
    pub enable_prefetch: bool,

    /// Optional sink for catalog events
    pub event_bus: Option<EventBus>,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("query_executor", &"QueryExecutor { ... }")
            .field("page_size", &self.page_size)
            .field("enable_prefetch", &self.enable_prefetch)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CatalogConfig {
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Check the page size is usable.
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)
    }
}

/// Reject page sizes a range request cannot express.
pub fn validate_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(Error::Config(
            "Page size must be greater than 0".to_string(),
        ));
    }

    if page_size > MAX_PAGE_SIZE {
        return Err(Error::Config(format!(
            "Page size {} exceeds maximum of {}",
            page_size, MAX_PAGE_SIZE
        )));
    }

    Ok(())
}

/// Builder for [`CatalogConfig`].
#[derive(Default)]
pub struct CatalogConfigBuilder {
    query_executor: Option<Arc<dyn QueryExecutor>>,
    page_size: Option<usize>,
    enable_prefetch: Option<bool>,
    event_bus: Option<EventBus>,
}

impl CatalogConfigBuilder {
    /// Sets the executor every page request goes through.
    pub fn query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    /// Sets the default page size (defaults to [`DEFAULT_PAGE_SIZE`]).
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Enables or disables next-page prefetching (enabled by default).
    pub fn enable_prefetch(mut self, enabled: bool) -> Self {
        self.enable_prefetch = Some(enabled);
        self
    }

    /// Publishes catalog events on `bus`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` when no query executor was provided
    /// - `Error::Config` when the page size is 0 or above [`MAX_PAGE_SIZE`]
    pub fn build(self) -> Result<CatalogConfig> {
        let query_executor = self.query_executor.ok_or_else(|| Error::CapabilityMissing {
            capability: "QueryExecutor".to_string(),
            message: "A QueryExecutor implementation is required to fetch song pages. \
                      Inject the host's backend client, or the in-memory executor \
                      from core-catalog for tests and demos."
                .to_string(),
        })?;

        let config = CatalogConfig {
            query_executor,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            enable_prefetch: self.enable_prefetch.unwrap_or(true),
            event_bus: self.event_bus,
        };

        config.validate()?;
        Ok(config)
    }
}
