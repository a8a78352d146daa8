//! Compound queries: equality filters, single-field ordering, limit, and
//! cursor pagination by document id.

use std::cmp::Ordering;

use chrono::DateTime;
use serde_json::Value;

use crate::document::{path_get, Document};

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub field: String,
    pub value: Value,
}

/// A query against one collection.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) collection: String,
    pub(crate) filters: Vec<Filter>,
    pub(crate) order: Option<(String, Direction)>,
    pub(crate) limit: Option<usize>,
    pub(crate) start_after: Option<String>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
            start_after: None,
        }
    }

    /// Keep only documents whose `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Order results by a single field.  Documents missing the field sort
    /// lowest (so they come last in descending order).
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    /// Resume after the document with this id (cursor pagination).  The
    /// cursor document itself is excluded from the results.
    ///
    /// The cursor positions by document id, not by order-field value: when
    /// the cursor document no longer matches the query (deleted between
    /// pages), the page starts from the top again and the caller may see
    /// documents it already received.  Callers that delete while paging
    /// must de-duplicate by id.
    pub fn start_after(mut self, doc_id: impl Into<String>) -> Self {
        self.start_after = Some(doc_id.into());
        self
    }

    pub(crate) fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| path_get(&doc.data, &f.field) == Some(&f.value))
    }

    /// Apply ordering, cursor, and limit to an already-filtered result set.
    pub(crate) fn finish(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order {
            docs.sort_by(|a, b| {
                let ord = compare_values(path_get(&a.data, field), path_get(&b.data, field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(cursor) = &self.start_after {
            if let Some(pos) = docs.iter().position(|d| &d.id == cursor) {
                docs.drain(..=pos);
            }
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }

        docs
    }
}

/// Total order over optional JSON values, Firestore-style: absent < null <
/// bool < number < string < array/object.  Strings that parse as RFC 3339
/// timestamps compare chronologically, so mixed-precision timestamps order
/// correctly.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
