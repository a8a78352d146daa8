//! Live subscriptions.
//!
//! A subscription is an independent push channel over one document or one
//! query: the full current snapshot is re-delivered on every underlying
//! change in the watched collection.  There is no ordering guarantee across
//! distinct subscriptions, only monotonic snapshots within one.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::docstore::{ChangeEvent, DocStore};
use crate::document::Document;
use crate::query::Query;

/// Handle to a live subscription delivering snapshots of type `T`.
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe)) tears
/// the channel down; nothing cancels a subscription automatically.
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: Clone> Subscription<T> {
    /// Assemble a subscription from a snapshot channel and its driver task.
    /// Used by higher layers to build derived subscriptions.
    pub fn from_parts(rx: watch::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    /// The most recently delivered snapshot.
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot.  Returns `false` once the channel is
    /// closed and no further snapshots will arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Explicitly cancel the subscription.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl DocStore {
    /// Live view of a single document.  Delivers `None` when the document
    /// does not exist or disappears.
    pub async fn watch_doc(
        self: &Arc<Self>,
        collection: &str,
        id: &str,
    ) -> Subscription<Option<Document>> {
        let initial = self.get(collection, id).await;
        let (tx, rx) = watch::channel(initial);

        let store = Arc::clone(self);
        let mut changes = self.subscribe_changes();
        let collection = collection.to_string();
        let id = id.to_string();

        let task = tokio::spawn(async move {
            loop {
                if !wait_for_change(&mut changes, |ev| {
                    ev.collection == collection && ev.doc_id == id
                })
                .await
                {
                    break;
                }
                let snapshot = store.get(&collection, &id).await;
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });

        Subscription::from_parts(rx, task)
    }

    /// Live view of a query result set.  Re-runs the query on every change
    /// in the target collection and delivers the full current result.
    pub async fn watch_query(self: &Arc<Self>, query: Query) -> Subscription<Vec<Document>> {
        let initial = self.query(&query).await;
        let (tx, rx) = watch::channel(initial);

        let store = Arc::clone(self);
        let mut changes = self.subscribe_changes();

        let task = tokio::spawn(async move {
            loop {
                if !wait_for_change(&mut changes, |ev| ev.collection == query.collection).await {
                    break;
                }
                let snapshot = store.query(&query).await;
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });

        Subscription::from_parts(rx, task)
    }
}

/// Block until a change matching `relevant` arrives.  Returns `false` when
/// the change feed is closed.  A lagged receiver resynchronizes by treating
/// the lag as a relevant change (the watcher re-reads the snapshot anyway).
async fn wait_for_change<F>(changes: &mut broadcast::Receiver<ChangeEvent>, relevant: F) -> bool
where
    F: Fn(&ChangeEvent) -> bool,
{
    loop {
        match changes.recv().await {
            Ok(event) if relevant(&event) => return true,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Subscription lagged behind the change feed");
                return true;
            }
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldOp;
    use crate::query::Direction;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn watch_doc_sees_create_update_delete() {
        let store = Arc::new(DocStore::new());
        let mut sub = store.watch_doc("chats", "c1").await;
        assert!(sub.current().is_none());

        store.set("chats", "c1", &json!({ "kind": "direct" })).await.unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert_eq!(sub.current().unwrap().get("kind"), Some(&json!("direct")));

        store
            .update("chats", "c1", vec![("unread".into(), FieldOp::Increment(1))])
            .await
            .unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert_eq!(sub.current().unwrap().get("unread"), Some(&json!(1)));

        store.delete("chats", "c1").await.unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert!(sub.current().is_none());
    }

    #[tokio::test]
    async fn watch_query_redelivers_full_result() {
        let store = Arc::new(DocStore::new());
        let query = Query::collection("messages")
            .where_eq("chat_id", "c1")
            .order_by("timestamp", Direction::Descending);
        let mut sub = store.watch_query(query).await;
        assert!(sub.current().is_empty());

        store
            .set(
                "messages",
                "m1",
                &json!({ "chat_id": "c1", "timestamp": "2026-01-01T00:00:01Z" }),
            )
            .await
            .unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert_eq!(sub.current().len(), 1);

        store
            .set(
                "messages",
                "m2",
                &json!({ "chat_id": "c1", "timestamp": "2026-01-01T00:00:02Z" }),
            )
            .await
            .unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        let ids: Vec<String> = sub.current().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["m2", "m1"]);
    }

    #[tokio::test]
    async fn unrelated_collections_do_not_fire() {
        let store = Arc::new(DocStore::new());
        let mut sub = store.watch_doc("chats", "c1").await;

        store.set("users", "u1", &json!({})).await.unwrap();
        assert!(timeout(Duration::from_millis(100), sub.changed())
            .await
            .is_err());
    }
}
