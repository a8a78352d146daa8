//! Schemaless documents and the field transforms a write batch can apply.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// A single stored document: an id plus a JSON object payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Build a document from any model that serializes to a JSON object.
    pub fn from_value<T: Serialize>(id: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            data: to_object(value)?,
        })
    }

    /// Deserialize the payload into a typed model.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }

    /// Read a field by dotted path (`unread.u1_u2` addresses a nested key).
    pub fn get(&self, path: &str) -> Option<&Value> {
        path_get(&self.data, path)
    }
}

/// Serialize a model into a document payload.  Fails unless the value
/// serializes to a JSON object.
pub(crate) fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Internal(
            "document payload must serialize to a JSON object".to_string(),
        )),
    }
}

/// A transform applied to one field of one document inside a write batch.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Overwrite the field with a literal value.
    Set(Value),
    /// Remove the field (the "delete field" sentinel for nested map keys).
    Delete,
    /// Atomic integer add; a missing or non-numeric field counts as 0.
    Increment(i64),
    /// Append each value not already present, preserving order.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value.
    ArrayRemove(Vec<Value>),
    /// Server-assigned timestamp.  Every `ServerTimestamp` in one batch
    /// resolves to the same instant.
    ServerTimestamp,
}

impl FieldOp {
    /// Apply this transform to `data` at `path`.  `now` is the batch-wide
    /// commit timestamp.
    pub(crate) fn apply(&self, data: &mut Map<String, Value>, path: &str, now: DateTime<Utc>) {
        match self {
            FieldOp::Set(value) => path_set(data, path, value.clone()),
            FieldOp::Delete => path_remove(data, path),
            FieldOp::Increment(delta) => {
                let current = path_get(data, path).and_then(Value::as_i64).unwrap_or(0);
                path_set(data, path, Value::from(current + delta));
            }
            FieldOp::ArrayUnion(values) => {
                let mut array = path_get(data, path)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for value in values {
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
                path_set(data, path, Value::Array(array));
            }
            FieldOp::ArrayRemove(values) => {
                let mut array = path_get(data, path)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                array.retain(|v| !values.contains(v));
                path_set(data, path, Value::Array(array));
            }
            FieldOp::ServerTimestamp => {
                let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
                path_set(data, path, Value::String(stamp));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dotted-path helpers
// ---------------------------------------------------------------------------

pub(crate) fn path_get<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current = data;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return current.get(part);
        }
        current = current.get(part)?.as_object()?;
    }
    None
}

/// Set a value at a dotted path, creating intermediate objects as needed.
/// An intermediate that exists but is not an object is replaced.
pub(crate) fn path_set(data: &mut Map<String, Value>, path: &str, value: Value) {
    let mut current = data;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), value);
            return;
        }
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry.as_object_mut().expect("just ensured object");
    }
}

pub(crate) fn path_remove(data: &mut Map<String, Value>, path: &str) {
    let mut current = data;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.remove(part);
            return;
        }
        match current.get_mut(part).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn nested_set_and_get() {
        let mut data = object(json!({}));
        path_set(&mut data, "unread.c1", json!(3));
        assert_eq!(path_get(&data, "unread.c1"), Some(&json!(3)));
        assert_eq!(path_get(&data, "unread.c2"), None);
    }

    #[test]
    fn set_replaces_non_object_intermediate() {
        let mut data = object(json!({ "last_message": null }));
        path_set(&mut data, "last_message.text", json!("hi"));
        assert_eq!(path_get(&data, "last_message.text"), Some(&json!("hi")));
    }

    #[test]
    fn increment_treats_missing_as_zero() {
        let mut data = object(json!({}));
        let now = Utc::now();
        FieldOp::Increment(1).apply(&mut data, "unread.c1", now);
        FieldOp::Increment(2).apply(&mut data, "unread.c1", now);
        assert_eq!(path_get(&data, "unread.c1"), Some(&json!(3)));
    }

    #[test]
    fn array_union_is_idempotent() {
        let mut data = object(json!({ "read_by": ["u1"] }));
        let now = Utc::now();
        FieldOp::ArrayUnion(vec![json!("u1"), json!("u2")]).apply(&mut data, "read_by", now);
        FieldOp::ArrayUnion(vec![json!("u2")]).apply(&mut data, "read_by", now);
        assert_eq!(path_get(&data, "read_by"), Some(&json!(["u1", "u2"])));
    }

    #[test]
    fn array_remove_drops_all_occurrences() {
        let mut data = object(json!({ "participants": ["u1", "u2", "u1"] }));
        FieldOp::ArrayRemove(vec![json!("u1")]).apply(&mut data, "participants", Utc::now());
        assert_eq!(path_get(&data, "participants"), Some(&json!(["u2"])));
    }

    #[test]
    fn delete_removes_single_nested_key() {
        let mut data = object(json!({ "unread": { "c1": 4, "c2": 0 } }));
        FieldOp::Delete.apply(&mut data, "unread.c1", Utc::now());
        assert_eq!(path_get(&data, "unread.c1"), None);
        assert_eq!(path_get(&data, "unread.c2"), Some(&json!(0)));
    }
}
