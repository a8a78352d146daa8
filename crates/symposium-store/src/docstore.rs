//! The document-store client handle.
//!
//! [`DocStore`] owns every collection and arbitrates all writes through a
//! single writer lock, which is what makes a [`WriteBatch`] all-or-nothing:
//! the whole batch is staged and validated against a scratch copy of the
//! touched documents before anything is written back, so a failed
//! precondition leaves the store untouched.  Change events fan out to watch
//! subscriptions only after a write is visible.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::batch::{BatchOp, WriteBatch};
use crate::document::{to_object, Document, FieldOp};
use crate::error::{Result, StoreError};
use crate::query::Query;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// One document changed (created, updated, or deleted).
#[derive(Debug, Clone)]
pub(crate) struct ChangeEvent {
    pub collection: String,
    pub doc_id: String,
}

type Collections = HashMap<String, BTreeMap<String, Map<String, Value>>>;

/// Handle to the document store.  Cheap to share via `Arc`; constructed
/// explicitly and passed to each component (no process-wide singleton).
pub struct DocStore {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for DocStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
        }
    }

    // ------------------------------------------------------------------
    // Single-document operations
    // ------------------------------------------------------------------

    /// Create-if-absent.  Fails with [`StoreError::AlreadyExists`] when the
    /// id is taken; the existing document is not modified.
    pub async fn create<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        let data = to_object(value)?;
        {
            let mut guard = self.collections.write().await;
            let coll = guard.entry(collection.to_string()).or_default();
            if coll.contains_key(id) {
                return Err(StoreError::AlreadyExists(id.to_string()));
            }
            coll.insert(id.to_string(), data);
        }
        self.notify(collection, id);
        Ok(())
    }

    /// Unconditional overwrite (upsert).
    pub async fn set<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        let data = to_object(value)?;
        {
            let mut guard = self.collections.write().await;
            guard
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), data);
        }
        self.notify(collection, id);
        Ok(())
    }

    /// Shallow merge into the existing document, creating it if absent.
    pub async fn set_merge<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<()> {
        let data = to_object(value)?;
        {
            let mut guard = self.collections.write().await;
            let entry = guard
                .entry(collection.to_string())
                .or_default()
                .entry(id.to_string())
                .or_default();
            for (key, value) in data {
                entry.insert(key, value);
            }
        }
        self.notify(collection, id);
        Ok(())
    }

    /// Fetch a single document.
    pub async fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let guard = self.collections.read().await;
        guard
            .get(collection)
            .and_then(|coll| coll.get(id))
            .map(|data| Document::new(id, data.clone()))
    }

    /// Fetch a document that must exist.
    pub async fn get_required(&self, collection: &str, id: &str) -> Result<Document> {
        self.get(collection, id).await.ok_or(StoreError::NotFound)
    }

    /// Apply field transforms to an existing document.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<()> {
        let now = Utc::now();
        {
            let mut guard = self.collections.write().await;
            let data = guard
                .get_mut(collection)
                .and_then(|coll| coll.get_mut(id))
                .ok_or(StoreError::NotFound)?;
            for (path, op) in &fields {
                op.apply(data, path, now);
            }
        }
        self.notify(collection, id);
        Ok(())
    }

    /// Delete a document.  Idempotent: deleting an absent document is Ok.
    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let removed = {
            let mut guard = self.collections.write().await;
            guard
                .get_mut(collection)
                .map(|coll| coll.remove(id).is_some())
                .unwrap_or(false)
        };
        if removed {
            self.notify(collection, id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Run a compound query against its collection.
    pub async fn query(&self, query: &Query) -> Vec<Document> {
        let guard = self.collections.read().await;
        let docs: Vec<Document> = guard
            .get(&query.collection)
            .map(|coll| {
                coll.iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .filter(|doc| query.matches(doc))
                    .collect()
            })
            .unwrap_or_default();
        query.finish(docs)
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Commit a write batch atomically.
    ///
    /// Ops apply in insertion order against a staged copy of the touched
    /// documents; a later op sees the staged effect of an earlier one (a
    /// `Create` followed by an `Update` of the same document is valid).
    /// Every `ServerTimestamp` in the batch resolves to the same instant.
    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let op_count = batch.len();
        let mut touched: Vec<(String, String)> = Vec::with_capacity(op_count);

        {
            let mut guard = self.collections.write().await;

            // Stage: validate and apply every op against scratch copies.
            let mut staged: HashMap<(String, String), Option<Map<String, Value>>> = HashMap::new();
            let lookup = |guard: &Collections,
                          staged: &HashMap<(String, String), Option<Map<String, Value>>>,
                          collection: &str,
                          id: &str| {
                match staged.get(&(collection.to_string(), id.to_string())) {
                    Some(entry) => entry.clone(),
                    None => guard.get(collection).and_then(|c| c.get(id)).cloned(),
                }
            };

            for op in &batch.ops {
                match op {
                    BatchOp::Create {
                        collection,
                        id,
                        data,
                    } => {
                        if lookup(&guard, &staged, collection, id).is_some() {
                            return Err(StoreError::AlreadyExists(id.clone()));
                        }
                        staged.insert((collection.clone(), id.clone()), Some(data.clone()));
                    }
                    BatchOp::Set {
                        collection,
                        id,
                        data,
                        merge,
                    } => {
                        let next = if *merge {
                            let mut existing =
                                lookup(&guard, &staged, collection, id).unwrap_or_default();
                            for (key, value) in data {
                                existing.insert(key.clone(), value.clone());
                            }
                            existing
                        } else {
                            data.clone()
                        };
                        staged.insert((collection.clone(), id.clone()), Some(next));
                    }
                    BatchOp::Update {
                        collection,
                        id,
                        fields,
                    } => {
                        let mut data = lookup(&guard, &staged, collection, id)
                            .ok_or(StoreError::NotFound)?;
                        for (path, field_op) in fields {
                            field_op.apply(&mut data, path, now);
                        }
                        staged.insert((collection.clone(), id.clone()), Some(data));
                    }
                    BatchOp::Delete { collection, id } => {
                        staged.insert((collection.clone(), id.clone()), None);
                    }
                }
            }

            // Write back: every precondition held, so this cannot fail.
            for ((collection, id), entry) in staged {
                let coll = guard.entry(collection.clone()).or_default();
                match entry {
                    Some(data) => {
                        coll.insert(id.clone(), data);
                    }
                    None => {
                        coll.remove(&id);
                    }
                }
                touched.push((collection, id));
            }
        }

        debug!(ops = op_count, docs = touched.len(), "Committed batch");
        for (collection, id) in touched {
            self.notify(&collection, &id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Change feed
    // ------------------------------------------------------------------

    pub(crate) fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn notify(&self, collection: &str, id: &str) {
        // Send fails only when no subscription is listening.
        let _ = self.changes.send(ChangeEvent {
            collection: collection.to_string(),
            doc_id: id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let store = DocStore::new();
        store
            .set("users", "u1", &json!({ "name": "Ada" }))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        assert!(store.get("users", "u2").await.is_none());
    }

    #[tokio::test]
    async fn create_rejects_existing_id() {
        let store = DocStore::new();
        store
            .create("chats", "c1", &json!({ "kind": "direct" }))
            .await
            .unwrap();

        let err = store
            .create("chats", "c1", &json!({ "kind": "group" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        // The original document is untouched.
        let doc = store.get("chats", "c1").await.unwrap();
        assert_eq!(doc.get("kind"), Some(&json!("direct")));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = DocStore::new();
        let err = store
            .update("chats", "missing", vec![("x".into(), FieldOp::Increment(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = DocStore::new();

        let mut batch = WriteBatch::new();
        batch.set("users", "u1", &json!({ "name": "Ada" })).unwrap();
        batch.update(
            "chats",
            "missing",
            vec![("unread.c1".into(), FieldOp::Increment(1))],
        );

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        // The valid first op must not have been applied.
        assert!(store.get("users", "u1").await.is_none());
    }

    #[tokio::test]
    async fn batch_create_then_update_same_doc() {
        let store = DocStore::new();

        let mut batch = WriteBatch::new();
        batch
            .create("messages", "m1", &json!({ "text": "hi" }))
            .unwrap();
        batch.update(
            "messages",
            "m1",
            vec![("timestamp".into(), FieldOp::ServerTimestamp)],
        );
        store.commit(batch).await.unwrap();

        let doc = store.get("messages", "m1").await.unwrap();
        assert!(doc.get("timestamp").unwrap().is_string());
    }

    #[tokio::test]
    async fn server_timestamps_share_one_instant_per_batch() {
        let store = DocStore::new();
        store.set("chats", "c1", &json!({})).await.unwrap();
        store.set("messages", "m1", &json!({})).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.update(
            "chats",
            "c1",
            vec![("updated_at".into(), FieldOp::ServerTimestamp)],
        );
        batch.update(
            "messages",
            "m1",
            vec![("timestamp".into(), FieldOp::ServerTimestamp)],
        );
        store.commit(batch).await.unwrap();

        let chat = store.get("chats", "c1").await.unwrap();
        let message = store.get("messages", "m1").await.unwrap();
        assert_eq!(chat.get("updated_at"), message.get("timestamp"));
    }

    #[tokio::test]
    async fn query_orders_filters_and_paginates() {
        let store = DocStore::new();
        for (id, chat, ts) in [
            ("m1", "c1", "2026-01-01T00:00:01Z"),
            ("m2", "c1", "2026-01-01T00:00:02Z"),
            ("m3", "c2", "2026-01-01T00:00:03Z"),
            ("m4", "c1", "2026-01-01T00:00:04Z"),
        ] {
            store
                .set("messages", id, &json!({ "chat_id": chat, "timestamp": ts }))
                .await
                .unwrap();
        }

        let query = Query::collection("messages")
            .where_eq("chat_id", "c1")
            .order_by("timestamp", Direction::Descending)
            .limit(2);
        let page: Vec<String> = store.query(&query).await.into_iter().map(|d| d.id).collect();
        assert_eq!(page, vec!["m4", "m2"]);

        let next = Query::collection("messages")
            .where_eq("chat_id", "c1")
            .order_by("timestamp", Direction::Descending)
            .start_after("m2")
            .limit(2);
        let page: Vec<String> = store.query(&next).await.into_iter().map(|d| d.id).collect();
        assert_eq!(page, vec!["m1"]);
    }

    #[tokio::test]
    async fn deleted_cursor_restarts_from_the_top() {
        let store = DocStore::new();
        for (id, ts) in [
            ("m1", "2026-01-01T00:00:01Z"),
            ("m2", "2026-01-01T00:00:02Z"),
            ("m3", "2026-01-01T00:00:03Z"),
        ] {
            store
                .set("messages", id, &json!({ "chat_id": "c1", "timestamp": ts }))
                .await
                .unwrap();
        }
        store.delete("messages", "m2").await.unwrap();

        // The cursor document is gone, so the page restarts from the top
        // (documented on `start_after`); callers de-duplicate by id.
        let query = Query::collection("messages")
            .where_eq("chat_id", "c1")
            .order_by("timestamp", Direction::Descending)
            .start_after("m2");
        let page: Vec<String> = store.query(&query).await.into_iter().map(|d| d.id).collect();
        assert_eq!(page, vec!["m3", "m1"]);
    }

    #[tokio::test]
    async fn set_merge_keeps_unrelated_fields() {
        let store = DocStore::new();
        store
            .set("users", "u1", &json!({ "name": "Ada", "field": "CS" }))
            .await
            .unwrap();
        store
            .set_merge("users", "u1", &json!({ "field": "Math" }))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap();
        assert_eq!(doc.get("name"), Some(&json!("Ada")));
        assert_eq!(doc.get("field"), Some(&json!("Math")));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = DocStore::new();
        store.set("users", "u1", &json!({})).await.unwrap();
        store.delete("users", "u1").await.unwrap();
        store.delete("users", "u1").await.unwrap();
        assert!(store.get("users", "u1").await.is_none());
    }
}
