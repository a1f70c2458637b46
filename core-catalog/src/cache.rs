//! Per-key page cache
//!
//! A [`CacheEntry`] holds the committed pages of one list, its cursor history
//! and lifecycle state. Entries are owned by the controller and only mutated
//! under its lock; observers read [`PagedListSnapshot`]s published through a
//! `tokio::sync::watch` channel, so reads never block on a fetch.

use crate::keys::{CacheKey, SongCollection};
use crate::models::Song;
use crate::pagination::{self, Page};
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of one paged list.
///
/// ```text
/// Uninitialized ─initialize─> Seeded ─┐
///       │                             ├─fetch─> FetchingNext ⇄ Ready ─short page─> Exhausted
///       └──fetch──> FetchingInitial ──┘               │
///                                                     └─failure─> Error (retry like Ready)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ListState {
    Uninitialized,
    Seeded,
    FetchingInitial,
    Ready,
    FetchingNext,
    Exhausted,
    /// The last request failed. Pages and `has_next` are unchanged and the
    /// list is idle again, so every operation treats it exactly like `Ready`.
    Error { message: String },
}

impl ListState {
    /// Idle with more pages possibly available: `Ready`, or `Error` after a
    /// failed request. Match on this rather than on `Ready` alone.
    pub fn is_ready_like(&self) -> bool {
        matches!(self, ListState::Ready | ListState::Error { .. })
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self, ListState::FetchingInitial | ListState::FetchingNext)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ListState::Exhausted)
    }
}

/// Point-in-time view of a paged list.
#[derive(Debug, Clone)]
pub struct PagedListSnapshot {
    pub key: CacheKey,
    pub page_size: usize,
    pub pages: Vec<Page>,
    pub cursors: Vec<u64>,
    pub has_next: bool,
    pub is_fetching_initial: bool,
    pub is_fetching_next: bool,
    /// A speculative fetch is outstanding
    pub is_prefetching: bool,
    pub state: ListState,
    pub generation: u64,
}

impl PagedListSnapshot {
    /// All pages concatenated in fetch order.
    pub fn songs(&self) -> Vec<Song> {
        self.pages
            .iter()
            .flat_map(|page| page.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_offset(&self) -> u64 {
        pagination::next_offset(self.pages.len(), self.page_size)
    }
}

pub(crate) type SharedFetch = Shared<BoxFuture<'static, crate::error::Result<Page>>>;

/// The one outstanding request of an entry's current generation.
pub(crate) struct InFlight {
    pub offset: u64,
    pub foreground: bool,
    pub request: SharedFetch,
}

pub(crate) struct CacheEntry {
    pub key: CacheKey,
    pub collection: SongCollection,
    pub page_size: usize,
    pub pages: Vec<Page>,
    pub cursors: Vec<u64>,
    pub generation: u64,
    pub state: ListState,
    pub in_flight: Option<InFlight>,
    notifier: watch::Sender<PagedListSnapshot>,
}

impl CacheEntry {
    pub fn new(collection: SongCollection, page_size: usize) -> Self {
        let key = collection.cache_key();
        let initial = PagedListSnapshot {
            key: key.clone(),
            page_size,
            pages: Vec::new(),
            cursors: Vec::new(),
            has_next: true,
            is_fetching_initial: false,
            is_fetching_next: false,
            is_prefetching: false,
            state: ListState::Uninitialized,
            generation: 0,
        };
        let (notifier, _) = watch::channel(initial);

        Self {
            key,
            collection,
            page_size,
            pages: Vec::new(),
            cursors: Vec::new(),
            generation: 0,
            state: ListState::Uninitialized,
            in_flight: None,
            notifier,
        }
    }

    pub fn next_offset(&self) -> u64 {
        pagination::next_offset(self.pages.len(), self.page_size)
    }

    /// An entry with no pages yet always has a next page to try.
    pub fn has_next(&self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.pages
            .last()
            .map_or(true, |page| pagination::has_more(page, self.page_size))
    }

    pub fn first_page(&self) -> Option<&[Song]> {
        self.pages.first().map(|page| page.as_ref())
    }

    /// Drop all pages and start a new generation.
    ///
    /// Any request still running for the old generation is detached; its
    /// result is discarded when it completes.
    pub fn reset(&mut self, page_size: usize) {
        self.page_size = page_size;
        self.pages.clear();
        self.cursors.clear();
        self.generation += 1;
        self.in_flight = None;
        self.state = ListState::Uninitialized;
    }

    /// Install `seed` as the first page at cursor 0.
    pub fn seed(&mut self, seed: Vec<Song>) {
        let exhausted = !pagination::has_more(&seed, self.page_size);
        self.pages = vec![Page::from(seed)];
        self.cursors = vec![0];
        self.state = if exhausted {
            ListState::Exhausted
        } else {
            ListState::Seeded
        };
    }

    /// Mark a foreground request as outstanding.
    pub fn begin_foreground(&mut self) {
        self.state = if self.pages.is_empty() {
            ListState::FetchingInitial
        } else {
            ListState::FetchingNext
        };
    }

    /// Leave a fetching state without committing anything.
    pub fn settle(&mut self) {
        if self.state.is_fetching() {
            self.state = if self.pages.is_empty() {
                ListState::Uninitialized
            } else {
                ListState::Ready
            };
        }
    }

    /// Append `page` if it is the page this entry is waiting for.
    ///
    /// Returns false when the offset does not continue the sequence.
    pub fn commit(&mut self, offset: u64, page: Page) -> bool {
        if offset != self.next_offset() {
            return false;
        }

        let more = pagination::has_more(&page, self.page_size);
        self.pages.push(page);
        self.cursors.push(offset);
        self.state = if more {
            ListState::Ready
        } else {
            ListState::Exhausted
        };
        true
    }

    pub fn snapshot(&self) -> PagedListSnapshot {
        PagedListSnapshot {
            key: self.key.clone(),
            page_size: self.page_size,
            pages: self.pages.clone(),
            cursors: self.cursors.clone(),
            has_next: self.has_next(),
            is_fetching_initial: self.state == ListState::FetchingInitial,
            is_fetching_next: self.state == ListState::FetchingNext,
            is_prefetching: self
                .in_flight
                .as_ref()
                .map_or(false, |in_flight| !in_flight.foreground),
            state: self.state.clone(),
            generation: self.generation,
        }
    }

    /// Push the current state to every watcher.
    pub fn publish(&self) {
        self.notifier.send_replace(self.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<PagedListSnapshot> {
        self.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn songs(count: usize) -> Vec<Song> {
        (0..count)
            .map(|i| Song {
                id: format!("s{}", i),
                user_id: "u1".to_string(),
                title: format!("Song {}", i),
                song_path: String::new(),
                image_path: String::new(),
                lyrics_path: None,
                created_at: String::new(),
                album_id: None,
                duration: 0.0,
                artists: Vec::new(),
                album: None,
            })
            .collect()
    }

    #[test]
    fn test_error_state_is_ready_like() {
        let failed = ListState::Error {
            message: "timeout".to_string(),
        };
        assert!(failed.is_ready_like());
        assert!(!failed.is_fetching());
        assert!(!failed.is_terminal());

        assert!(ListState::Ready.is_ready_like());
        for state in [
            ListState::Uninitialized,
            ListState::Seeded,
            ListState::FetchingNext,
            ListState::Exhausted,
        ] {
            assert!(!state.is_ready_like(), "{:?}", state);
        }
    }

    #[test]
    fn test_new_entry_has_next() {
        let entry = CacheEntry::new(SongCollection::all(), 20);
        assert_eq!(entry.state, ListState::Uninitialized);
        assert!(entry.has_next());
        assert_eq!(entry.next_offset(), 0);
    }

    #[test]
    fn test_seed_full_and_short_pages() {
        let mut entry = CacheEntry::new(SongCollection::all(), 20);
        entry.seed(songs(20));
        assert_eq!(entry.state, ListState::Seeded);
        assert_eq!(entry.cursors, vec![0]);
        assert_eq!(entry.next_offset(), 20);

        let mut entry = CacheEntry::new(SongCollection::all(), 20);
        entry.seed(songs(3));
        assert_eq!(entry.state, ListState::Exhausted);
        assert!(!entry.has_next());
    }

    #[test]
    fn test_commit_rejects_out_of_sequence_offset() {
        let mut entry = CacheEntry::new(SongCollection::liked("u1"), 10);
        entry.seed(songs(10));

        assert!(!entry.commit(0, Page::from(songs(10))));
        assert!(!entry.commit(20, Page::from(songs(10))));
        assert_eq!(entry.pages.len(), 1);

        assert!(entry.commit(10, Page::from(songs(10))));
        assert_eq!(entry.state, ListState::Ready);
        assert_eq!(entry.cursors, vec![0, 10]);
    }

    #[test]
    fn test_reset_bumps_generation() {
        let mut entry = CacheEntry::new(SongCollection::all(), 20);
        entry.seed(songs(20));
        entry.reset(20);

        assert_eq!(entry.generation, 1);
        assert!(entry.pages.is_empty());
        assert_eq!(entry.state, ListState::Uninitialized);
    }

    #[test]
    fn test_publish_reaches_watchers() {
        let mut entry = CacheEntry::new(SongCollection::all(), 20);
        let watcher = entry.subscribe();

        entry.seed(songs(20));
        entry.publish();

        let snapshot = watcher.borrow().clone();
        assert_eq!(snapshot.len(), 20);
        assert_eq!(snapshot.songs()[0].id, "s0");
        assert!(snapshot.has_next);
        assert_eq!(snapshot.next_offset(), 20);
    }
}
