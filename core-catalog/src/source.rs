//! Song source: query shapes per collection
//!
//! Builds the range-bounded select for each [`SongCollection`], runs it
//! through the host [`QueryExecutor`] and normalizes every returned row.

use crate::error::Result;
use crate::keys::SongCollection;
use crate::models::Song;
use crate::normalize::{self, RejectReason, RowOutcome};
use crate::pagination::PageRequest;
use bridge_traits::{QueryExecutor, RawRow, SelectQuery};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Songs table.
pub const SONGS_TABLE: &str = "songs";

/// Link table between users and the songs they liked.
pub const LIKED_SONGS_TABLE: &str = "liked_songs";

/// Song row with its album and artist relations embedded.
pub const SONG_PROJECTION: &str = "*, album:album_id(*), song_artists(artists(*))";

/// Liked-song link row with the song embedded under `songs`.
pub const LIKED_SONG_PROJECTION: &str =
    "*, songs(*, album:album_id(*), song_artists(artists(*)))";

/// Column every scoped collection filters on.
pub const USER_COLUMN: &str = "user_id";

/// Column pages are ordered by (newest first).
pub const ORDER_COLUMN: &str = "created_at";

/// Build the select for one page of `collection`.
///
/// Scoped collections without a scope are queried unfiltered.
pub fn build_query(collection: &SongCollection, request: PageRequest) -> SelectQuery {
    let query = match collection {
        SongCollection::AllSongs | SongCollection::UserSongs { .. } => {
            SelectQuery::select(SONGS_TABLE, SONG_PROJECTION)
        }
        SongCollection::LikedSongs { .. } => {
            SelectQuery::select(LIKED_SONGS_TABLE, LIKED_SONG_PROJECTION)
        }
    };

    let query = match collection.scope() {
        Some(user_id) => query.filter_eq(USER_COLUMN, user_id),
        None => query,
    };

    query
        .order_by(ORDER_COLUMN, true)
        .range(request.offset, request.range_end())
}

/// Parse one row returned for `collection`.
pub fn parse_collection_row(collection: &SongCollection, row: &RawRow) -> RowOutcome {
    match collection {
        SongCollection::LikedSongs { .. } => match row.get("songs") {
            Some(song) if !song.is_null() => normalize::parse_row(song),
            _ => RowOutcome::Rejected(RejectReason::Absent),
        },
        _ => normalize::parse_row(row),
    }
}

/// Fetches and normalizes pages through a [`QueryExecutor`].
#[derive(Clone)]
pub struct SongSource {
    executor: Arc<dyn QueryExecutor>,
}

impl SongSource {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Fetch one page. Rejected rows are dropped, so the page may be shorter
    /// than requested or empty. A failed request fails the whole page.
    #[instrument(skip(self, collection), fields(kind = %collection.kind(), offset = request.offset))]
    pub async fn fetch_page(
        &self,
        collection: &SongCollection,
        request: PageRequest,
    ) -> Result<Vec<Song>> {
        let query = build_query(collection, request);
        debug!(%query, "Executing page query");

        let rows = self.executor.execute(query).await?;
        let fetched = rows.len();

        let songs: Vec<Song> = rows
            .iter()
            .filter_map(|row| parse_collection_row(collection, row).accept())
            .collect();

        debug!(rows = fetched, accepted = songs.len(), "Page normalized");
        Ok(songs)
    }
}

impl std::fmt::Debug for SongSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongSource")
            .field("executor", &"QueryExecutor { ... }")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{OrderBy, QueryValue, RowRange};
    use mockall::mock;
    use serde_json::json;

    mock! {
        Executor {}

        #[async_trait]
        impl QueryExecutor for Executor {
            async fn execute(&self, query: SelectQuery) -> BridgeResult<Vec<RawRow>>;
        }
    }

    fn song_row(id: &str) -> RawRow {
        json!({
            "id": id,
            "user_id": "u1",
            "title": format!("Title {}", id),
            "created_at": "2024-05-01T10:00:00+00:00",
            "song_artists": []
        })
    }

    #[test]
    fn test_all_songs_query() {
        let query = build_query(&SongCollection::all(), PageRequest::new(20, 20));

        assert_eq!(query.table, SONGS_TABLE);
        assert_eq!(query.projection, SONG_PROJECTION);
        assert!(query.filters.is_empty());
        assert_eq!(query.range, Some(RowRange { start: 20, end: 39 }));
        assert_eq!(
            query.order,
            vec![OrderBy {
                column: "created_at".to_string(),
                descending: true
            }]
        );
    }

    #[test]
    fn test_scoped_queries_filter_on_user() {
        let liked = build_query(&SongCollection::liked("u1"), PageRequest::new(0, 10));
        assert_eq!(liked.table, LIKED_SONGS_TABLE);
        assert_eq!(liked.projection, LIKED_SONG_PROJECTION);
        assert_eq!(liked.filter_value("user_id"), Some(&QueryValue::from("u1")));

        let uploads = build_query(&SongCollection::user_songs("u2"), PageRequest::new(0, 10));
        assert_eq!(uploads.table, SONGS_TABLE);
        assert_eq!(uploads.filter_value("user_id"), Some(&QueryValue::from("u2")));
    }

    #[test]
    fn test_unscoped_collection_is_unfiltered() {
        let query = build_query(
            &SongCollection::UserSongs { user_id: None },
            PageRequest::new(0, 10),
        );
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_liked_rows_are_unwrapped() {
        let liked = SongCollection::liked("u1");

        let row = json!({ "user_id": "u1", "song_id": "s1", "songs": song_row("s1") });
        assert!(parse_collection_row(&liked, &row).is_valid());

        let orphan = json!({ "user_id": "u1", "song_id": "s2", "songs": null });
        assert_eq!(
            parse_collection_row(&liked, &orphan),
            RowOutcome::Rejected(RejectReason::Absent)
        );
    }

    #[tokio::test]
    async fn test_fetch_page_drops_rejected_rows() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .withf(|query| query.range == Some(RowRange { start: 0, end: 2 }))
            .times(1)
            .returning(|_| {
                Ok(vec![
                    song_row("s1"),
                    json!({ "id": "", "title": "no id" }),
                    song_row("s3"),
                ])
            });

        let source = SongSource::new(Arc::new(executor));
        let page = source
            .fetch_page(&SongCollection::all(), PageRequest::new(0, 3))
            .await
            .unwrap();

        let ids: Vec<_> = page.iter().map(|song| song.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[tokio::test]
    async fn test_fetch_page_propagates_request_failure() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .returning(|_| Err(BridgeError::QueryFailed("connection reset".to_string())));

        let source = SongSource::new(Arc::new(executor));
        let result = source
            .fetch_page(&SongCollection::liked("u1"), PageRequest::new(0, 20))
            .await;

        assert_eq!(
            result,
            Err(CatalogError::Bridge(BridgeError::QueryFailed(
                "connection reset".to_string()
            )))
        );
    }
}
