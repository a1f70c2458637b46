//! # Paginated Fetch Controller
//!
//! Orchestrates range fetches for every open song list, accumulates pages in
//! the per-key cache and speculatively fetches the next page once a
//! foreground page lands.
//!
//! ## Overview
//!
//! ```text
//! PagedList::fetch_next ──> dispatch ──(spawn)──> SongSource::fetch_page ──> QueryExecutor
//!        ▲                     │                          │
//!        │              in-flight request                 ▼
//!        └──── Shared ◄────────┘                  complete: commit page,
//!                                                 publish snapshot,
//!                                                 schedule prefetch
//! ```
//!
//! - At most one request is outstanding per cache entry. A second caller for
//!   the same page joins it through a [`Shared`](futures::future::Shared)
//!   future instead of issuing a duplicate.
//! - Requests run on spawned tokio tasks, so a prefetch completes even when
//!   nobody awaits it.
//! - Every entry carries a generation. Re-seeding or invalidating a key starts
//!   a new generation, and results of older requests are discarded.
//! - A page is committed only if it continues the list at its current
//!   `next_offset`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_catalog::{PagedFetchController, SongCollection};
//!
//! let controller = PagedFetchController::from_config(&config);
//! let list = controller.open(SongCollection::liked(user_id), None, server_rendered)?;
//!
//! while list.has_next() {
//!     let page = list.fetch_next().await?;
//!     render(list.songs());
//! }
//! ```

use crate::cache::{CacheEntry, InFlight, ListState, PagedListSnapshot, SharedFetch};
use crate::error::{CatalogError, Result};
use crate::keys::{CacheKey, SongCollection};
use crate::models::Song;
use crate::pagination::{Page, PageRequest};
use crate::source::SongSource;
use bridge_traits::QueryExecutor;
use core_runtime::config::{validate_page_size, CatalogConfig, DEFAULT_PAGE_SIZE};
use core_runtime::events::{CatalogEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Outcome of asking for a page.
enum Dispatch {
    Pending(SharedFetch),
    Exhausted,
    Skipped,
}

/// Owns the page cache and every request against it.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct PagedFetchController {
    inner: Arc<Inner>,
}

struct Inner {
    source: SongSource,
    page_size: usize,
    enable_prefetch: bool,
    events: Option<EventBus>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl PagedFetchController {
    /// Controller with default page size and prefetching enabled.
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_settings(executor, DEFAULT_PAGE_SIZE, true, None)
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::with_settings(
            Arc::clone(&config.query_executor),
            config.page_size,
            config.enable_prefetch,
            config.event_bus.clone(),
        )
    }

    fn with_settings(
        executor: Arc<dyn QueryExecutor>,
        page_size: usize,
        enable_prefetch: bool,
        events: Option<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: SongSource::new(executor),
                page_size,
                enable_prefetch,
                events,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Default page size for lists opened without one.
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn prefetch_enabled(&self) -> bool {
        self.inner.enable_prefetch
    }

    /// Uncached access to the underlying page fetcher.
    pub fn source(&self) -> &SongSource {
        &self.inner.source
    }

    /// Install `seed` as the first page of `collection` without fetching.
    ///
    /// Calling this again with an equal seed and page size leaves the entry
    /// untouched, including pages fetched since. A different seed replaces
    /// the entry and detaches any request still in flight for it. With no
    /// seed an existing entry is kept as is.
    pub fn initialize(
        &self,
        collection: &SongCollection,
        seed: Option<Vec<Song>>,
        page_size: usize,
    ) -> Result<CacheKey> {
        self.install(collection, seed, page_size)
            .map(|(key, _)| key)
    }

    /// Open a paged list over `collection`.
    ///
    /// `page_size` defaults to the controller's. No request is issued; the
    /// first `fetch_next` either continues after the seed or loads offset 0.
    pub fn open(
        &self,
        collection: SongCollection,
        page_size: Option<usize>,
        seed: Option<Vec<Song>>,
    ) -> Result<PagedList> {
        let page_size = page_size.unwrap_or(self.inner.page_size);
        let (key, receiver) = self.install(&collection, seed, page_size)?;

        Ok(PagedList {
            controller: self.clone(),
            collection,
            key,
            receiver,
        })
    }

    fn install(
        &self,
        collection: &SongCollection,
        seed: Option<Vec<Song>>,
        page_size: usize,
    ) -> Result<(CacheKey, watch::Receiver<PagedListSnapshot>)> {
        validate_page_size(page_size)?;
        let key = collection.cache_key();

        let (receiver, replaced) = {
            let mut entries = self.inner.lock();
            let (entry, created) = match entries.entry(key.clone()) {
                Entry::Occupied(occupied) => (occupied.into_mut(), false),
                Entry::Vacant(vacant) => (
                    vacant.insert(CacheEntry::new(collection.clone(), page_size)),
                    true,
                ),
            };

            let unchanged = entry.page_size == page_size
                && match &seed {
                    None => true,
                    Some(seed) => entry.first_page() == Some(seed.as_slice()),
                };

            if !created && unchanged {
                debug!(key = %log_key(&key), "Paged list already initialized");
                return Ok((key, entry.subscribe()));
            }

            let replaced = !created && (!entry.pages.is_empty() || entry.in_flight.is_some());
            if !created {
                entry.reset(page_size);
            }
            if let Some(seed) = seed {
                debug!(key = %log_key(&key), songs = seed.len(), "Seeding paged list");
                entry.seed(seed);
            }
            entry.publish();

            (entry.subscribe(), replaced)
        };

        if replaced {
            self.inner
                .emit(CatalogEvent::Invalidated { key: key.to_string() });
        }

        Ok((key, receiver))
    }

    /// Current snapshot of `key`, if a list was ever opened for it.
    pub fn snapshot(&self, key: &CacheKey) -> Option<PagedListSnapshot> {
        self.inner.lock().get(key).map(CacheEntry::snapshot)
    }

    /// Request the page after the last committed one.
    ///
    /// The request is dispatched before this returns; the future only waits
    /// for it. An exhausted list resolves to an empty page without a request.
    pub fn fetch_next(&self, key: &CacheKey) -> BoxFuture<'static, Result<Page>> {
        match self.inner.dispatch(key, true) {
            Ok(Dispatch::Pending(request)) => request.boxed(),
            Ok(Dispatch::Exhausted) | Ok(Dispatch::Skipped) => {
                future::ready(Ok(Page::from(Vec::new()))).boxed()
            }
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    /// Start a background fetch of the next page.
    ///
    /// Returns false when the list is exhausted or a request is already
    /// outstanding. Unlike the automatic prefetch this ignores the
    /// `enable_prefetch` setting.
    pub fn prefetch_next(&self, key: &CacheKey) -> bool {
        match self.inner.dispatch(key, false) {
            Ok(Dispatch::Pending(_)) => true,
            Ok(_) => false,
            Err(err) => {
                warn!(key = %log_key(key), error = %err, "Prefetch not started");
                false
            }
        }
    }

    /// Drop every page of `key` and start a new generation.
    ///
    /// Returns false if no list was ever opened for `key`.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        {
            let mut entries = self.inner.lock();
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            let page_size = entry.page_size;
            entry.reset(page_size);
            entry.publish();
        }

        info!(key = %log_key(key), "Paged list invalidated");
        self.inner
            .emit(CatalogEvent::Invalidated { key: key.to_string() });
        true
    }
}

impl std::fmt::Debug for PagedFetchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFetchController")
            .field("page_size", &self.inner.page_size)
            .field("enable_prefetch", &self.inner.enable_prefetch)
            .field("entries", &self.inner.lock().len())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine
            bus.emit(event).ok();
        }
    }

    fn dispatch(self: &Arc<Self>, key: &CacheKey, foreground: bool) -> Result<Dispatch> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CatalogError::InvalidInput {
                field: "key".to_string(),
                message: format!("No paged list is open for '{}'", key),
            })?;

        if !entry.has_next() {
            return Ok(Dispatch::Exhausted);
        }

        if let Some(in_flight) = entry.in_flight.as_mut() {
            if !foreground {
                return Ok(Dispatch::Skipped);
            }

            let request = in_flight.request.clone();
            let upgraded = !in_flight.foreground;
            in_flight.foreground = true;

            if upgraded {
                debug!(
                    key = %log_key(key),
                    offset = in_flight.offset,
                    "Joining in-flight prefetch"
                );
                entry.begin_foreground();
                entry.publish();
            }
            return Ok(Dispatch::Pending(request));
        }

        let runtime = Handle::try_current().map_err(|err| {
            CatalogError::TaskFailed(format!("No tokio runtime to run the request on: {}", err))
        })?;

        let generation = entry.generation;
        let request = PageRequest::new(entry.next_offset(), entry.page_size);
        let task = runtime.spawn(Arc::clone(self).run_fetch(
            key.clone(),
            entry.collection.clone(),
            generation,
            request,
        ));

        let inner = Arc::clone(self);
        let task_key = key.clone();
        let shared: SharedFetch = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    inner.abandon(&task_key, generation, request.offset);
                    Err(CatalogError::TaskFailed(err.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        entry.in_flight = Some(InFlight {
            offset: request.offset,
            foreground,
            request: shared.clone(),
        });
        if foreground {
            entry.begin_foreground();
        }
        entry.publish();
        drop(entries);

        debug!(
            key = %log_key(key),
            offset = request.offset,
            foreground,
            "Page request started"
        );
        if !foreground {
            self.emit(CatalogEvent::PrefetchScheduled {
                key: key.to_string(),
                offset: request.offset,
            });
        }

        Ok(Dispatch::Pending(shared))
    }

    fn run_fetch(
        self: Arc<Self>,
        key: CacheKey,
        collection: SongCollection,
        generation: u64,
        request: PageRequest,
    ) -> BoxFuture<'static, Result<Page>> {
        async move {
            let result = self
                .source
                .fetch_page(&collection, request)
                .await
                .map(Page::from);
            self.complete(&key, generation, request.offset, result)
        }
        .boxed()
    }

    /// Apply a finished request to its entry and hand the result back to
    /// whoever awaits it. Stale results are returned but never committed.
    fn complete(
        self: &Arc<Self>,
        key: &CacheKey,
        generation: u64,
        offset: u64,
        result: Result<Page>,
    ) -> Result<Page> {
        let mut events = Vec::new();

        let schedule_prefetch = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return result;
            };

            if entry.generation != generation {
                debug!(
                    key = %log_key(key),
                    offset,
                    generation,
                    "Discarding result of superseded request"
                );
                return result;
            }

            let foreground = entry
                .in_flight
                .take()
                .map_or(false, |in_flight| in_flight.foreground);

            let committed = match &result {
                Ok(page) => entry.commit(offset, Arc::clone(page)),
                Err(_) => false,
            };

            let schedule_prefetch = match &result {
                Ok(_) if !committed => {
                    debug!(
                        key = %log_key(key),
                        offset,
                        expected = entry.next_offset(),
                        "Discarding page that does not continue the list"
                    );
                    entry.settle();
                    false
                }
                Ok(page) => {
                    debug!(
                        key = %log_key(key),
                        offset,
                        count = page.len(),
                        prefetched = !foreground,
                        "Page committed"
                    );
                    events.push(CatalogEvent::PageLoaded {
                        key: key.to_string(),
                        offset,
                        count: page.len(),
                        prefetched: !foreground,
                    });

                    if entry.state == ListState::Exhausted {
                        info!(key = %log_key(key), pages = entry.pages.len(), "Paged list exhausted");
                        events.push(CatalogEvent::Exhausted {
                            key: key.to_string(),
                        });
                    }

                    foreground && entry.has_next()
                }
                Err(err) => {
                    warn!(
                        key = %log_key(key),
                        offset,
                        prefetched = !foreground,
                        error = %err,
                        "Page fetch failed"
                    );
                    if foreground {
                        entry.state = ListState::Error {
                            message: err.to_string(),
                        };
                    }
                    events.push(CatalogEvent::FetchFailed {
                        key: key.to_string(),
                        offset,
                        message: err.to_string(),
                        prefetched: !foreground,
                    });
                    false
                }
            };

            entry.publish();
            schedule_prefetch
        };

        for event in events {
            self.emit(event);
        }

        if schedule_prefetch && self.enable_prefetch {
            if let Err(err) = self.dispatch(key, false) {
                warn!(key = %log_key(key), error = %err, "Prefetch not started");
            }
        }

        result
    }

    /// Clear a request whose task died before completing.
    fn abandon(&self, key: &CacheKey, generation: u64, offset: u64) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            let matches = entry.generation == generation
                && entry
                    .in_flight
                    .as_ref()
                    .map_or(false, |in_flight| in_flight.offset == offset);
            if matches {
                entry.in_flight = None;
                entry.settle();
                entry.publish();
            }
        }
    }
}

/// Key rendered for logs with the user scope redacted.
fn log_key(key: &CacheKey) -> String {
    let namespace = key.segments()[..2].join("/");
    match key.scope() {
        Some(scope) => format!("{}/{}", namespace, redact_if_sensitive("scope", scope)),
        None => namespace,
    }
}

/// Handle to one open paged list.
///
/// Reads come from the latest published snapshot and never wait on a
/// request. Clones refer to the same list.
#[derive(Clone)]
pub struct PagedList {
    controller: PagedFetchController,
    collection: SongCollection,
    key: CacheKey,
    receiver: watch::Receiver<PagedListSnapshot>,
}

impl PagedList {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn collection(&self) -> &SongCollection {
        &self.collection
    }

    pub fn snapshot(&self) -> PagedListSnapshot {
        self.receiver.borrow().clone()
    }

    /// Every committed song, pages concatenated in fetch order.
    pub fn songs(&self) -> Vec<Song> {
        self.receiver.borrow().songs()
    }

    pub fn pages(&self) -> Vec<Page> {
        self.receiver.borrow().pages.clone()
    }

    pub fn len(&self) -> usize {
        self.receiver.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_next(&self) -> bool {
        self.receiver.borrow().has_next
    }

    pub fn is_fetching_initial(&self) -> bool {
        self.receiver.borrow().is_fetching_initial
    }

    pub fn is_fetching_next(&self) -> bool {
        self.receiver.borrow().is_fetching_next
    }

    pub fn is_prefetching(&self) -> bool {
        self.receiver.borrow().is_prefetching
    }

    pub fn state(&self) -> ListState {
        self.receiver.borrow().state.clone()
    }

    /// Fetch the next page; see [`PagedFetchController::fetch_next`].
    ///
    /// Retrying after a failure is another call to this method.
    pub fn fetch_next(&self) -> BoxFuture<'static, Result<Page>> {
        self.controller.fetch_next(&self.key)
    }

    pub fn prefetch_next(&self) -> bool {
        self.controller.prefetch_next(&self.key)
    }

    /// Change notifications for this list.
    pub fn subscribe(&self) -> watch::Receiver<PagedListSnapshot> {
        self.receiver.clone()
    }

    pub fn invalidate(&self) -> bool {
        self.controller.invalidate(&self.key)
    }
}

impl std::fmt::Debug for PagedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.receiver.borrow();
        f.debug_struct("PagedList")
            .field("key", &self.key)
            .field("songs", &snapshot.len())
            .field("state", &snapshot.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryQueryExecutor;
    use serde_json::json;

    fn rows(count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| {
                json!({
                    "id": format!("s{:03}", i),
                    "user_id": "u1",
                    "title": format!("Song {}", i),
                    "created_at": format!("2024-01-01T00:{:02}:{:02}+00:00", (999 - i) / 60, (999 - i) % 60),
                })
            })
            .collect()
    }

    fn controller(total: usize) -> (PagedFetchController, Arc<InMemoryQueryExecutor>) {
        let executor = Arc::new(InMemoryQueryExecutor::new().with_table("songs", rows(total)));
        let controller = PagedFetchController::with_settings(executor.clone(), 10, false, None);
        (controller, executor)
    }

    #[test]
    fn test_log_key_redacts_scope() {
        assert_eq!(log_key(&SongCollection::all().cache_key()), "songs/all");
        assert_eq!(
            log_key(&SongCollection::liked("5f1c9a2e").cache_key()),
            "songs/liked/5f1c***"
        );
    }

    #[test]
    fn test_open_rejects_zero_page_size() {
        let (controller, _) = controller(0);
        let result = controller.open(SongCollection::all(), Some(0), None);
        assert!(matches!(
            result,
            Err(CatalogError::InvalidInput { ref field, .. }) if field == "config"
        ));
    }

    #[test]
    fn test_open_issues_no_request() {
        let (controller, executor) = controller(30);
        let list = controller.open(SongCollection::all(), None, None).unwrap();

        assert_eq!(list.state(), ListState::Uninitialized);
        assert!(list.has_next());
        assert!(list.is_empty());
        assert_eq!(executor.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_from_uninitialized_starts_at_zero() {
        let (controller, executor) = controller(15);
        let list = controller.open(SongCollection::all(), None, None).unwrap();

        let pending = list.fetch_next();
        assert!(list.is_fetching_initial());

        let page = pending.await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].id, "s000");
        assert_eq!(list.state(), ListState::Ready);
        assert_eq!(executor.requests()[0].range.map(|r| r.start), Some(0));

        let page = list.fetch_next().await.unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(list.state(), ListState::Exhausted);
        assert_eq!(list.snapshot().cursors, vec![0, 10]);
    }

    #[tokio::test]
    async fn test_exhausted_list_issues_no_request() {
        let (controller, executor) = controller(4);
        let list = controller.open(SongCollection::all(), None, None).unwrap();

        list.fetch_next().await.unwrap();
        assert!(!list.has_next());

        let page = list.fetch_next().await.unwrap();
        assert!(page.is_empty());
        assert_eq!(executor.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_next_on_unknown_key() {
        let (controller, _) = controller(0);
        let result = controller
            .fetch_next(&SongCollection::liked("nobody").cache_key())
            .await;
        assert!(matches!(result, Err(CatalogError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_invalidate_resets_entry() {
        let (controller, _) = controller(25);
        let list = controller.open(SongCollection::all(), None, None).unwrap();
        list.fetch_next().await.unwrap();

        assert!(list.invalidate());
        let snapshot = list.snapshot();
        assert_eq!(snapshot.state, ListState::Uninitialized);
        assert!(snapshot.pages.is_empty());
        assert_eq!(snapshot.generation, 1);

        let page = list.fetch_next().await.unwrap();
        assert_eq!(page[0].id, "s000");

        assert!(!controller.invalidate(&SongCollection::liked("u9").cache_key()));
    }
}
