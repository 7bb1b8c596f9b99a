//! Storage types shared by every document store backend.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Hard ceiling on page size, regardless of what the caller asks for.
pub const MAX_PAGE_SIZE: usize = 500;

/// A JSON document as stored in a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDocument {
    /// Collection (table-like namespace) the document lives in.
    pub collection: String,
    /// Document ID, unique within its collection.
    pub id: String,
    /// Monotonic version, starting at 1 on insert.
    pub version: u64,
    /// The full document content.
    pub body: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredDocument {
    /// Creates a freshly inserted document (version 1).
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            collection: collection.into(),
            id: id.into(),
            version: 1,
            body,
            created_at: now,
            updated_at: now,
        }
    }

    /// Produces the next version of this document with new content.
    #[must_use]
    pub fn next_version(&self, body: Value) -> Self {
        Self {
            collection: self.collection.clone(),
            id: self.id.clone(),
            version: self.version + 1,
            body,
            created_at: self.created_at,
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Sort order on a top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// A query over one collection.
///
/// Filters are equality tests on top-level fields and are AND-ed together.
/// Without a sort the order is insertion time, then id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter on a top-level field.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Effective page size after applying the hard ceiling.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    /// Returns `true` when `body` satisfies every filter.
    #[must_use]
    pub fn matches(&self, body: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| body.get(field).unwrap_or(&Value::Null) == expected)
    }

    /// Filters as a single JSON object, suitable for JSONB containment.
    #[must_use]
    pub fn filter_object(&self) -> Value {
        let map = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }

    /// Orders two documents according to this query.
    #[must_use]
    pub fn compare(&self, a: &StoredDocument, b: &StoredDocument) -> Ordering {
        let default_order = a
            .created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id));
        match &self.sort {
            None => default_order,
            Some(sort) => {
                let ord = compare_values(
                    a.body.get(&sort.field).unwrap_or(&Value::Null),
                    b.body.get(&sort.field).unwrap_or(&Value::Null),
                );
                let ord = if sort.descending { ord.reverse() } else { ord };
                ord.then(default_order)
            }
        }
    }
}

/// Total order over JSON scalars: null < bool < number < string < other.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches before limit/offset were applied.
    pub total: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Converts every item, keeping the total.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_matches_all_filters() {
        let q = Query::new().eq("kind", "workshop").eq("status", "open");
        assert!(q.matches(&json!({"kind": "workshop", "status": "open", "title": "x"})));
        assert!(!q.matches(&json!({"kind": "workshop", "status": "draft"})));
        assert!(!q.matches(&json!({"status": "open"})));
    }

    #[test]
    fn null_filter_matches_missing_field() {
        let q = Query::new().eq("session_id", Value::Null);
        assert!(q.matches(&json!({"id": "a"})));
    }

    #[test]
    fn filter_object_collects_pairs() {
        let q = Query::new().eq("a", 1).eq("b", "x");
        assert_eq!(q.filter_object(), json!({"a": 1, "b": "x"}));
    }

    #[test]
    fn effective_limit_is_capped() {
        assert_eq!(Query::new().effective_limit(), MAX_PAGE_SIZE);
        assert_eq!(Query::new().limit(10).effective_limit(), 10);
        assert_eq!(Query::new().limit(10_000).effective_limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn compare_by_field_then_insertion() {
        let a = StoredDocument::new("c", "a", json!({"n": 2}));
        let b = StoredDocument::new("c", "b", json!({"n": 1}));
        let q = Query::new().sort(Sort::asc("n"));
        assert_eq!(q.compare(&a, &b), Ordering::Greater);
        let q = Query::new().sort(Sort::desc("n"));
        assert_eq!(q.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn next_version_increments() {
        let doc = StoredDocument::new("c", "a", json!({}));
        let next = doc.next_version(json!({"x": 1}));
        assert_eq!(next.version, 2);
        assert_eq!(next.created_at, doc.created_at);
    }
}
