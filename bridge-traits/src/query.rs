//! Query Execution Abstraction
//!
//! The catalog never talks to a backend directly. It describes what it wants
//! as a [`SelectQuery`] and hands it to a host-provided [`QueryExecutor`]:
//! - Hosted: a PostgREST/Supabase-style HTTP client
//! - Tests and demos: the in-memory executor shipped with `core-catalog`
//!
//! ## Query model
//!
//! A query selects from one table with a projection string (PostgREST select
//! syntax, relations included), narrows it with equality filters, orders it,
//! and bounds it with an inclusive row range:
//!
//! ```
//! use bridge_traits::query::{QueryValue, SelectQuery};
//!
//! let query = SelectQuery::select("songs", "*")
//!     .filter_eq("user_id", "user-1")
//!     .range(0, 19)
//!     .order_by("created_at", true);
//!
//! assert_eq!(query.range.unwrap().len(), 20);
//! assert_eq!(query.filters[0].value, QueryValue::Text("user-1".to_string()));
//! ```
//!
//! Rows come back as untrusted JSON ([`RawRow`]); validating their shape is the
//! caller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// One row as returned by the backend, nested relations included.
pub type RawRow = serde_json::Value;

/// Scalar value used in query filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl QueryValue {
    /// Convert to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            QueryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to &str if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, QueryValue::Null)
    }

    /// JSON form, used when comparing against a [`RawRow`] column.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryValue::Null => serde_json::Value::Null,
            QueryValue::Boolean(b) => serde_json::Value::Bool(*b),
            QueryValue::Integer(i) => serde_json::Value::from(*i),
            QueryValue::Real(r) => serde_json::Value::from(*r),
            QueryValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Boolean(value)
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Null => write!(f, "null"),
            QueryValue::Boolean(b) => write!(f, "{}", b),
            QueryValue::Integer(i) => write!(f, "{}", i),
            QueryValue::Real(r) => write!(f, "{}", r),
            QueryValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// `column = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqFilter {
    pub column: String,
    pub value: QueryValue,
}

/// Inclusive row window `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

impl RowRange {
    /// Number of rows the window can hold
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// A range-bounded, ordered select against a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    /// Projection in PostgREST select syntax, e.g. `*, album:album_id(*)`
    pub projection: String,
    pub filters: Vec<EqFilter>,
    pub range: Option<RowRange>,
    pub order: Vec<OrderBy>,
}

impl SelectQuery {
    pub fn select(table: impl Into<String>, projection: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: projection.into(),
            filters: Vec::new(),
            range: None,
            order: Vec::new(),
        }
    }

    pub fn filter_eq(mut self, column: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.filters.push(EqFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Bound the result to rows `start..=end`. A later call replaces an earlier one.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some(RowRange { start, end });
        self
    }

    /// Append a sort key. Keys apply in the order they were added.
    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            descending,
        });
        self
    }

    /// Value of the equality filter on `column`, if one was added.
    pub fn filter_value(&self, column: &str) -> Option<&QueryValue> {
        self.filters
            .iter()
            .find(|filter| filter.column == column)
            .map(|filter| &filter.value)
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select from {}", self.table)?;
        for filter in &self.filters {
            write!(f, " {}=eq.{}", filter.column, filter.value)?;
        }
        for order in &self.order {
            let direction = if order.descending { "desc" } else { "asc" };
            write!(f, " order={}.{}", order.column, direction)?;
        }
        if let Some(range) = self.range {
            write!(f, " range={}-{}", range.start, range.end)?;
        }
        Ok(())
    }
}

/// Executes [`SelectQuery`] values against the backing store.
///
/// ## Error Handling
///
/// A request-level failure (transport error, backend rejection, timeout) is
/// reported as `Err`. There is no partial success: either every row of the
/// window is returned or the request failed. Timeouts are the executor's
/// concern; callers impose none.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: SelectQuery) -> Result<Vec<RawRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;
    use serde_json::json;

    mock! {
        Executor {}

        #[async_trait]
        impl QueryExecutor for Executor {
            async fn execute(&self, query: SelectQuery) -> Result<Vec<RawRow>>;
        }
    }

    #[test]
    fn test_select_query_builder() {
        let query = SelectQuery::select("liked_songs", "*, songs(*)")
            .filter_eq("user_id", "u1")
            .range(20, 39)
            .order_by("created_at", true);

        assert_eq!(query.table, "liked_songs");
        assert_eq!(query.projection, "*, songs(*)");
        assert_eq!(query.filter_value("user_id"), Some(&QueryValue::from("u1")));
        assert_eq!(query.filter_value("id"), None);
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
    fn test_range_replaces_previous() {
        let query = SelectQuery::select("songs", "*").range(0, 9).range(10, 19);
        assert_eq!(query.range, Some(RowRange { start: 10, end: 19 }));
    }

    #[test]
    fn test_row_range_len() {
        assert_eq!(RowRange { start: 0, end: 19 }.len(), 20);
        assert_eq!(RowRange { start: 40, end: 40 }.len(), 1);
        assert!(RowRange { start: 5, end: 4 }.is_empty());
    }

    #[test]
    fn test_query_value_conversions() {
        assert_eq!(QueryValue::from(7_i64).as_i64(), Some(7));
        assert_eq!(QueryValue::from("abc").as_str(), Some("abc"));
        assert!(QueryValue::Null.is_null());
        assert_eq!(QueryValue::from(true).to_json(), json!(true));
        assert_eq!(QueryValue::Text("x".into()).to_json(), json!("x"));
    }

    #[test]
    fn test_select_query_display() {
        let query = SelectQuery::select("songs", "*")
            .filter_eq("user_id", "u1")
            .order_by("created_at", true)
            .range(0, 19);

        assert_eq!(
            query.to_string(),
            "select from songs user_id=eq.u1 order=created_at.desc range=0-19"
        );
    }

    #[tokio::test]
    async fn test_executor_trait_object() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .withf(|query| query.table == "songs")
            .times(1)
            .returning(|_| Ok(vec![json!({"id": "s1"})]));
        executor
            .expect_execute()
            .withf(|query| query.table == "missing")
            .returning(|_| Err(BridgeError::QueryFailed("relation does not exist".into())));

        let executor: Box<dyn QueryExecutor> = Box::new(executor);

        let rows = executor
            .execute(SelectQuery::select("songs", "*"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let err = executor
            .execute(SelectQuery::select("missing", "*"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::QueryFailed(_)));
    }
}
