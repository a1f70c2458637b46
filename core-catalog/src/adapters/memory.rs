//! In-memory Query Executor
//!
//! Implements [`QueryExecutor`] over tables of pre-joined JSON rows, the way a
//! PostgREST backend would return them. Projections are not interpreted:
//! rows are stored with their relations already embedded.
//!
//! ## Features
//!
//! - Equality filters on top-level columns
//! - Ordering by string or numeric columns
//! - Inclusive row ranges
//! - Failure injection and a log of every request received

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{QueryExecutor, RawRow, SelectQuery};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

#[derive(Default)]
struct Failures {
    next: Option<BridgeError>,
    sticky: Option<BridgeError>,
}

/// [`QueryExecutor`] backed by in-process tables.
#[derive(Default)]
pub struct InMemoryQueryExecutor {
    tables: RwLock<HashMap<String, Vec<RawRow>>>,
    failures: Mutex<Failures>,
    requests: Mutex<Vec<SelectQuery>>,
}

impl InMemoryQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert_rows`](Self::insert_rows).
    pub fn with_table(self, table: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.insert_rows(table, rows);
        self
    }

    /// Append rows to `table`, creating it if needed.
    pub fn insert_rows(&self, table: impl Into<String>, rows: Vec<RawRow>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.entry(table.into()).or_default().extend(rows);
    }

    /// Fail the next request with `error`, then behave normally.
    pub fn fail_next_request(&self, error: BridgeError) {
        self.failures_mut().next = Some(error);
    }

    /// Fail every request with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<BridgeError>) {
        self.failures_mut().sticky = error;
    }

    /// Every query received so far, oldest first.
    pub fn requests(&self) -> Vec<SelectQuery> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn failures_mut(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, query: &SelectQuery) -> Result<Vec<RawRow>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let table = tables.get(&query.table).ok_or_else(|| {
            BridgeError::QueryFailed(format!("relation \"{}\" does not exist", query.table))
        })?;

        let mut rows: Vec<&RawRow> = table
            .iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|filter| row.get(&filter.column) == Some(&filter.value.to_json()))
            })
            .collect();

        for order in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let (skip, take) = match query.range {
            Some(range) => (range.start as usize, range.len() as usize),
            None => (0, rows.len()),
        };

        Ok(rows.into_iter().skip(skip).take(take).cloned().collect())
    }
}

/// Missing and null values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl QueryExecutor for InMemoryQueryExecutor {
    async fn execute(&self, query: SelectQuery) -> Result<Vec<RawRow>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());

        let injected = {
            let mut failures = self.failures_mut();
            failures.next.take().or_else(|| failures.sticky.clone())
        };
        if let Some(error) = injected {
            debug!(%query, error = %error, "Injected query failure");
            return Err(error);
        }

        let rows = self.run(&query)?;
        debug!(%query, rows = rows.len(), "In-memory query executed");
        Ok(rows)
    }
}

impl std::fmt::Debug for InMemoryQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryQueryExecutor")
            .field("tables", &tables.keys().collect::<Vec<_>>())
            .field("requests", &self.request_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> InMemoryQueryExecutor {
        InMemoryQueryExecutor::new().with_table(
            "songs",
            vec![
                json!({ "id": "a", "user_id": "u1", "created_at": "2024-01-01" }),
                json!({ "id": "b", "user_id": "u2", "created_at": "2024-03-01" }),
                json!({ "id": "c", "user_id": "u1", "created_at": "2024-02-01" }),
                json!({ "id": "d", "user_id": "u1", "created_at": null }),
            ],
        )
    }

    fn ids(rows: &[RawRow]) -> Vec<&str> {
        rows.iter().filter_map(|row| row["id"].as_str()).collect()
    }

    #[tokio::test]
    async fn test_filter_order_and_range() {
        let executor = executor();
        let query = SelectQuery::select("songs", "*")
            .filter_eq("user_id", "u1")
            .order_by("created_at", true)
            .range(0, 1);

        let rows = executor.execute(query).await.unwrap();
        assert_eq!(ids(&rows), vec!["c", "a"]);

        let rest = executor
            .execute(
                SelectQuery::select("songs", "*")
                    .filter_eq("user_id", "u1")
                    .order_by("created_at", true)
                    .range(2, 3),
            )
            .await
            .unwrap();
        assert_eq!(ids(&rest), vec!["d"]);
    }

    #[tokio::test]
    async fn test_range_past_end_is_empty() {
        let rows = executor()
            .execute(SelectQuery::select("songs", "*").range(10, 19))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let result = executor()
            .execute(SelectQuery::select("playlists", "*"))
            .await;
        assert!(matches!(result, Err(BridgeError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let executor = executor();
        executor.fail_next_request(BridgeError::Timeout("slow".to_string()));

        let query = SelectQuery::select("songs", "*");
        assert!(executor.execute(query.clone()).await.is_err());
        assert!(executor.execute(query.clone()).await.is_ok());

        executor.set_failure(Some(BridgeError::NotAvailable("offline".to_string())));
        assert!(executor.execute(query.clone()).await.is_err());
        assert!(executor.execute(query.clone()).await.is_err());

        executor.set_failure(None);
        assert!(executor.execute(query).await.is_ok());
        assert_eq!(executor.request_count(), 5);
    }
}
