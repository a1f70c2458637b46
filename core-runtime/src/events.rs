//! # Catalog Events
//!
//! Broadcasts catalog progress using `tokio::sync::broadcast` so hosts can
//! react to page loads, prefetches and failures without polling.
//!
//! ## Overview
//!
//! - **Event Types**: [`CatalogEvent`], one variant per observable transition
//! - **EventBus**: Cloneable broadcast sender
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────────┐   emit    ┌──────────┐  subscribe  ┌────────────┐
//! │ PagedFetch       ├──────────>│ EventBus ├────────────>│ Subscriber │
//! │ Controller       │           └──────────┘             └────────────┘
//! └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CatalogEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CatalogEvent::Exhausted { key: "songs/all".to_string() }).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.key(), "songs/all");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; stop.
//!
//! Emitting with no subscribers returns `Err`, which publishers are free to ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use tokio::sync::broadcast::error::TryRecvError;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Undelivered events a subscriber may fall behind by before it lags.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Observable transitions of a paged song list.
///
/// `key` is the display form of the list's cache key (e.g. `songs/liked/u1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    /// A page was fetched, normalized and committed to the cache.
    PageLoaded {
        key: String,
        offset: u64,
        /// Songs in the page after row rejects were dropped
        count: usize,
        /// True when the page arrived through a speculative prefetch
        prefetched: bool,
    },
    /// A speculative fetch of the next page was started.
    PrefetchScheduled { key: String, offset: u64 },
    /// A page request failed; cached pages are untouched.
    FetchFailed {
        key: String,
        offset: u64,
        message: String,
        prefetched: bool,
    },
    /// The last page was shorter than the page size; no further fetches.
    Exhausted { key: String },
    /// The cache entry was dropped or replaced by fresh seed data.
    Invalidated { key: String },
}

impl CatalogEvent {
    /// Cache key the event belongs to.
    pub fn key(&self) -> &str {
        match self {
            CatalogEvent::PageLoaded { key, .. }
            | CatalogEvent::PrefetchScheduled { key, .. }
            | CatalogEvent::FetchFailed { key, .. }
            | CatalogEvent::Exhausted { key }
            | CatalogEvent::Invalidated { key } => key,
        }
    }

    /// Short label for host UIs and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            CatalogEvent::PageLoaded { .. } => "Page loaded",
            CatalogEvent::PrefetchScheduled { .. } => "Prefetch scheduled",
            CatalogEvent::FetchFailed { .. } => "Page fetch failed",
            CatalogEvent::Exhausted { .. } => "No more pages",
            CatalogEvent::Invalidated { .. } => "Cache entry invalidated",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CatalogEvent::FetchFailed {
                prefetched: false, ..
            } => EventSeverity::Error,
            CatalogEvent::FetchFailed { .. } => EventSeverity::Warning,
            CatalogEvent::PageLoaded {
                prefetched: false, ..
            }
            | CatalogEvent::Exhausted { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Cloneable handle to the catalog's broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let (sender, _initial) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to every live receiver and return how many there
    /// were. Fails only when nobody is subscribed.
    pub fn emit(&self, event: CatalogEvent) -> Result<usize, SendError<CatalogEvent>> {
        self.sender.send(event)
    }

    /// Receiver for events emitted from now on.
    pub fn subscribe(&self) -> Receiver<CatalogEvent> {
        self.sender.subscribe()
    }

    /// Subscribe and wrap the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

type EventPredicate = Box<dyn Fn(&CatalogEvent) -> bool + Send + Sync>;

/// Receiver that skips events rejected by its predicate.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let liked_only = EventStream::new(bus.subscribe())
///     .filter(|event| event.key().starts_with("songs/liked"));
/// ```
pub struct EventStream {
    receiver: Receiver<CatalogEvent>,
    predicate: Option<EventPredicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CatalogEvent>) -> Self {
        Self {
            receiver,
            predicate: None,
        }
    }

    /// Keep only events for which `keep` returns true.
    pub fn filter<F>(mut self, keep: F) -> Self
    where
        F: Fn(&CatalogEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(keep));
        self
    }

    fn accepts(&self, event: &CatalogEvent) -> bool {
        match &self.predicate {
            Some(keep) => keep(event),
            None => true,
        }
    }

    pub async fn recv(&mut self) -> Result<CatalogEvent, RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Ok(event),
                Ok(_) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// `None` once the buffer holds no accepted event.
    pub fn try_recv(&mut self) -> Option<Result<CatalogEvent, RecvError>> {
        loop {
            let outcome = match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => Ok(event),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(skipped)) => Err(RecvError::Lagged(skipped)),
                Err(TryRecvError::Closed) => Err(RecvError::Closed),
            };
            return Some(outcome);
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}
