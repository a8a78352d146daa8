//! Realtime fan-out: live views over chats, messages, and the per-user
//! chat list.
//!
//! Each subscription is an independent push channel re-delivering the full
//! current snapshot on every underlying change.  There is no ordering
//! guarantee across subscriptions or relative to the imperative operations;
//! a chat-list update may arrive before or after the message update for the
//! same logical event.

use std::sync::Arc;

use tokio::sync::watch;

use symposium_shared::{ChatId, UserId};
use symposium_store::{Direction, DocStore, Document, Query, Subscription};

use crate::collections::{CHATS, MESSAGES, USER_CHATS};
use crate::config::ChatConfig;
use crate::directory::chat_from_doc;
use crate::models::{sort_newest_first, Chat, Message, UserChats};

/// Factory for live chat subscriptions.
pub struct ChatLive {
    store: Arc<DocStore>,
    config: ChatConfig,
}

impl ChatLive {
    pub fn new(store: Arc<DocStore>, config: ChatConfig) -> Self {
        Self { store, config }
    }

    /// Live view of the most recent messages of a chat, newest first,
    /// capped at the configured live page size.
    pub async fn watch_messages(&self, chat_id: &ChatId) -> Subscription<Vec<Message>> {
        let query = Query::collection(MESSAGES)
            .where_eq("chat_id", chat_id.as_str())
            .order_by("timestamp", Direction::Descending)
            .limit(self.config.live_page_size);
        let mut inner = self.store.watch_query(query).await;

        let (tx, rx) = watch::channel(to_messages(inner.current()));
        let task = tokio::spawn(async move {
            while inner.changed().await {
                if tx.send(to_messages(inner.current())).is_err() {
                    break;
                }
            }
        });
        Subscription::from_parts(rx, task)
    }

    /// Live view of one chat document; `None` when it does not exist or
    /// disappears.
    pub async fn watch_chat(&self, chat_id: &ChatId) -> Subscription<Option<Chat>> {
        let mut inner = self.store.watch_doc(CHATS, chat_id.as_str()).await;

        let (tx, rx) = watch::channel(inner.current().as_ref().and_then(chat_from_doc));
        let task = tokio::spawn(async move {
            while inner.changed().await {
                let snapshot = inner.current().as_ref().and_then(chat_from_doc);
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });
        Subscription::from_parts(rx, task)
    }

    /// Live view of a user's chat list, newest activity first.
    ///
    /// Every index change triggers a full re-resolution of the referenced
    /// chats — including changes that only touched the unread map; the
    /// store has no partial-field subscription to do better with.
    pub async fn watch_user_chats(&self, user: &UserId) -> Subscription<Vec<Chat>> {
        let store = Arc::clone(&self.store);
        let mut inner = self.store.watch_doc(USER_CHATS, user.as_str()).await;

        let initial = resolve_chats(&store, inner.current()).await;
        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(async move {
            while inner.changed().await {
                let snapshot = resolve_chats(&store, inner.current()).await;
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });
        Subscription::from_parts(rx, task)
    }
}

fn to_messages(docs: Vec<Document>) -> Vec<Message> {
    docs.iter()
        .filter_map(|doc| doc.deserialize::<Message>().ok())
        .collect()
}

/// Resolve an index snapshot to its chats, dropping dangling references.
async fn resolve_chats(store: &Arc<DocStore>, index: Option<Document>) -> Vec<Chat> {
    let Some(index) = index.and_then(|doc| doc.deserialize::<UserChats>().ok()) else {
        return Vec::new();
    };

    let fetches = index
        .chat_ids
        .iter()
        .map(|chat_id| store.get(CHATS, chat_id.as_str()));
    let docs = futures::future::join_all(fetches).await;

    let mut chats: Vec<Chat> = docs
        .into_iter()
        .flatten()
        .filter_map(|doc| chat_from_doc(&doc))
        .collect();
    sort_newest_first(&mut chats);
    chats
}
