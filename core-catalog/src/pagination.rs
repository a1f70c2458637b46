//! Offset arithmetic shared by the fetch source and the controller.

use crate::models::Song;
use std::sync::Arc;

/// One committed page of songs. Cheap to clone and share with observers.
pub type Page = Arc<[Song]>;

/// Inclusive row window for one page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub offset: u64,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(offset: u64, page_size: usize) -> Self {
        Self { offset, page_size }
    }

    /// Last row index of the window (inclusive).
    pub fn range_end(&self) -> u64 {
        self.offset + (self.page_size as u64).saturating_sub(1)
    }
}

/// A short page means the collection is exhausted.
pub fn has_more<T>(last_page: &[T], page_size: usize) -> bool {
    last_page.len() >= page_size
}

/// Offset of the page after `page_count` full pages.
pub fn next_offset(page_count: usize, page_size: usize) -> u64 {
    (page_count as u64) * (page_size as u64)
}
