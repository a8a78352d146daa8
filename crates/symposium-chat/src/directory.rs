//! Chat directory: chat documents, participant lists, and the per-user
//! chat index with unread counters.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info};

use symposium_shared::{ChatId, UserId};
use symposium_store::{DocStore, Document, FieldOp, StoreError, WriteBatch};

use crate::collections::{CHATS, USERS, USER_CHATS};
use crate::error::{ChatError, Result};
use crate::models::{sort_newest_first, Chat, ChatKind, UserChats};

/// Behavior switches for [`ChatDirectory`].
#[derive(Debug, Clone, Default)]
pub struct DirectoryOptions {
    /// Require every participant id to resolve to a stored user profile
    /// before a chat is created.  Off by default: the rest of the layer
    /// tolerates chats referencing since-deleted users, so creation does
    /// too unless the embedding application opts in.
    pub validate_participants: bool,
}

/// Partial update for group chat metadata.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
}

/// Directory of chats and per-user chat indexes.
pub struct ChatDirectory {
    store: Arc<DocStore>,
    options: DirectoryOptions,
}

impl ChatDirectory {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self::with_options(store, DirectoryOptions::default())
    }

    pub fn with_options(store: Arc<DocStore>, options: DirectoryOptions) -> Self {
        Self { store, options }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create (or find) the direct chat between two users.
    ///
    /// The chat id is the canonical sorted join of the two user ids, so the
    /// pair can never own two direct chats.  Idempotent: when the chat
    /// already exists the id is returned with zero writes performed — the
    /// whole creation batch hinges on a create-if-absent of the chat
    /// document, so a concurrent first contact is decided by the store and
    /// the losing writer simply observes the winner's chat.
    pub async fn create_direct_chat(&self, a: &UserId, b: &UserId) -> Result<ChatId> {
        let chat_id = ChatId::direct(a, b);

        if self.options.validate_participants {
            for user in [a, b] {
                if self.store.get(USERS, user.as_str()).await.is_none() {
                    return Err(ChatError::UserNotFound(user.clone()));
                }
            }
        }

        let chat = Chat {
            id: chat_id.clone(),
            kind: ChatKind::Direct,
            participants: vec![a.clone(), b.clone()],
            group_name: None,
            created_at: None,
            updated_at: None,
            last_message: None,
        };

        let mut batch = WriteBatch::new();
        batch.create(CHATS, chat_id.as_str(), &chat)?;
        batch.update(
            CHATS,
            chat_id.as_str(),
            vec![
                ("created_at".into(), FieldOp::ServerTimestamp),
                ("updated_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        for user in [a, b] {
            self.register_participant(&mut batch, &chat_id, user).await?;
        }

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(chat = %chat_id, "Created direct chat");
                Ok(chat_id)
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(chat = %chat_id, "Direct chat already exists");
                Ok(chat_id)
            }
            Err(e) => {
                error!(error = %e, chat = %chat_id, "Failed to create direct chat");
                Err(e.into())
            }
        }
    }

    /// Create a group chat.  The participant set is the de-duplicated union
    /// of the creator and the provided members.
    pub async fn create_group_chat(
        &self,
        creator: &UserId,
        members: &[UserId],
        name: &str,
    ) -> Result<ChatId> {
        let chat_id = ChatId::random();

        let mut participants = vec![creator.clone()];
        for member in members {
            if !participants.contains(member) {
                participants.push(member.clone());
            }
        }

        if self.options.validate_participants {
            for user in &participants {
                if self.store.get(USERS, user.as_str()).await.is_none() {
                    return Err(ChatError::UserNotFound(user.clone()));
                }
            }
        }

        let chat = Chat {
            id: chat_id.clone(),
            kind: ChatKind::Group,
            participants: participants.clone(),
            group_name: Some(name.to_string()),
            created_at: None,
            updated_at: None,
            last_message: None,
        };

        let mut batch = WriteBatch::new();
        batch.create(CHATS, chat_id.as_str(), &chat)?;
        batch.update(
            CHATS,
            chat_id.as_str(),
            vec![
                ("created_at".into(), FieldOp::ServerTimestamp),
                ("updated_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        for user in &participants {
            self.register_participant(&mut batch, &chat_id, user).await?;
        }
        self.store.commit(batch).await?;

        info!(chat = %chat_id, members = participants.len(), "Created group chat");
        Ok(chat_id)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// One-shot snapshot of a user's chats, newest activity first.
    /// Dangling index entries (chats that no longer resolve) are dropped.
    pub async fn user_chats(&self, user: &UserId) -> Result<Vec<Chat>> {
        let index = match self.store.get(USER_CHATS, user.as_str()).await {
            Some(doc) => doc.deserialize::<UserChats>()?,
            None => return Ok(Vec::new()),
        };

        let fetches = index
            .chat_ids
            .iter()
            .map(|chat_id| self.store.get(CHATS, chat_id.as_str()));
        let docs = futures::future::join_all(fetches).await;

        let mut chats: Vec<Chat> = docs
            .into_iter()
            .flatten()
            .filter_map(|doc| doc.deserialize::<Chat>().ok())
            .collect();
        sort_newest_first(&mut chats);
        Ok(chats)
    }

    /// The current unread counter for one chat in a user's index.
    pub async fn unread_count(&self, user: &UserId, chat_id: &ChatId) -> Result<i64> {
        let index = match self.store.get(USER_CHATS, user.as_str()).await {
            Some(doc) => doc.deserialize::<UserChats>()?,
            None => return Ok(0),
        };
        Ok(index.unread.get(chat_id).copied().unwrap_or(0))
    }

    /// Participant list of a group chat.
    pub async fn group_members(&self, chat_id: &ChatId) -> Result<Vec<UserId>> {
        let chat = self.require_group(chat_id).await?;
        Ok(chat.participants)
    }

    // ------------------------------------------------------------------
    // Group membership & metadata
    // ------------------------------------------------------------------

    /// Add a user to a group chat.  No-op when already a member (so an
    /// existing unread counter is never reset by a redundant add).
    pub async fn add_member(&self, chat_id: &ChatId, user: &UserId) -> Result<()> {
        let chat = self.require_group(chat_id).await?;
        if chat.participants.contains(user) {
            debug!(chat = %chat_id, user = %user, "Already a member");
            return Ok(());
        }

        let mut batch = WriteBatch::new();
        batch.update(
            CHATS,
            chat_id.as_str(),
            vec![(
                "participants".into(),
                FieldOp::ArrayUnion(vec![Value::String(user.as_str().to_string())]),
            )],
        );
        self.register_participant(&mut batch, chat_id, user).await?;
        self.store.commit(batch).await?;

        info!(chat = %chat_id, user = %user, "Added group member");
        Ok(())
    }

    /// Remove a user from a group chat, clearing their unread entry.
    pub async fn remove_member(&self, chat_id: &ChatId, user: &UserId) -> Result<()> {
        self.require_group(chat_id).await?;

        let mut batch = WriteBatch::new();
        batch.update(
            CHATS,
            chat_id.as_str(),
            vec![(
                "participants".into(),
                FieldOp::ArrayRemove(vec![Value::String(user.as_str().to_string())]),
            )],
        );
        if self.store.get(USER_CHATS, user.as_str()).await.is_some() {
            batch.update(
                USER_CHATS,
                user.as_str(),
                vec![
                    (
                        "chat_ids".into(),
                        FieldOp::ArrayRemove(vec![Value::String(chat_id.as_str().to_string())]),
                    ),
                    (format!("unread.{chat_id}"), FieldOp::Delete),
                ],
            );
        }
        self.store.commit(batch).await?;

        info!(chat = %chat_id, user = %user, "Removed group member");
        Ok(())
    }

    /// Merge metadata fields into a group chat and refresh `updated_at`.
    pub async fn update_group(&self, chat_id: &ChatId, update: GroupUpdate) -> Result<()> {
        self.require_group(chat_id).await?;

        let mut fields: Vec<(String, FieldOp)> = Vec::new();
        if let Some(name) = update.name {
            fields.push(("group_name".into(), FieldOp::Set(Value::String(name))));
        }
        fields.push(("updated_at".into(), FieldOp::ServerTimestamp));

        self.store.update(CHATS, chat_id.as_str(), fields).await?;
        debug!(chat = %chat_id, "Updated group details");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Load a chat and require it to be a group.
    async fn require_group(&self, chat_id: &ChatId) -> Result<Chat> {
        let doc = self
            .store
            .get(CHATS, chat_id.as_str())
            .await
            .ok_or(ChatError::ChatNotFound)?;
        let chat: Chat = doc.deserialize()?;
        if chat.kind != ChatKind::Group {
            return Err(ChatError::NotGroupChat);
        }
        Ok(chat)
    }

    /// Queue index writes registering `chat_id` for `user`: lazily create
    /// the index document, record the membership, and zero the unread
    /// counter for the new chat.
    async fn register_participant(
        &self,
        batch: &mut WriteBatch,
        chat_id: &ChatId,
        user: &UserId,
    ) -> Result<()> {
        match self.store.get(USER_CHATS, user.as_str()).await {
            Some(_) => {
                batch.update(
                    USER_CHATS,
                    user.as_str(),
                    vec![
                        (
                            "chat_ids".into(),
                            FieldOp::ArrayUnion(vec![Value::String(chat_id.as_str().to_string())]),
                        ),
                        (format!("unread.{chat_id}"), FieldOp::Set(json!(0))),
                    ],
                );
            }
            None => {
                let mut index = UserChats::default();
                index.chat_ids.push(chat_id.clone());
                index.unread.insert(chat_id.clone(), 0);
                batch.set_merge(USER_CHATS, user.as_str(), &index)?;
            }
        }
        Ok(())
    }
}

/// Deserialize a chat document, used by tests and the realtime layer.
pub(crate) fn chat_from_doc(doc: &Document) -> Option<Chat> {
    doc.deserialize::<Chat>().ok()
}
