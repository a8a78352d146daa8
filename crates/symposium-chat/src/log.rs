//! Append-only message log with attachments and read receipts.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use symposium_shared::{ChatId, MessageId, UserId};
use symposium_store::{BlobStore, Direction, DocStore, FieldOp, Query, StoreError, WriteBatch};

use crate::collections::{CHATS, MESSAGES, USER_CHATS};
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::models::{Attachment, Chat, Message, MessageDraft, UserChats};

/// The per-chat message log.
pub struct MessageLog {
    store: Arc<DocStore>,
    blobs: Arc<BlobStore>,
    config: ChatConfig,
}

impl MessageLog {
    pub fn new(store: Arc<DocStore>, blobs: Arc<BlobStore>, config: ChatConfig) -> Self {
        Self {
            store,
            blobs,
            config,
        }
    }

    /// Send a message.
    ///
    /// Attachments upload first; any upload failure aborts the send before a
    /// single document write happens, so no partial message is ever visible.
    /// One batch then creates the message (`read_by` seeded with the
    /// sender), refreshes the chat's denormalized `last_message` and
    /// `updated_at` with the same server timestamp the message carries, and
    /// increments the unread counter of every other participant.
    pub async fn send(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        draft: MessageDraft,
    ) -> Result<MessageId> {
        let chat_doc = self
            .store
            .get(CHATS, chat_id.as_str())
            .await
            .ok_or(ChatError::ChatNotFound)?;
        let chat: Chat = chat_doc.deserialize()?;

        let mut attachments = Vec::with_capacity(draft.uploads.len());
        let stamp = Utc::now().timestamp_millis();
        for upload in &draft.uploads {
            let key = format!("chats/{}/{}_{}", chat_id, stamp, upload.name);
            let url = self
                .blobs
                .put(&key, &upload.bytes)
                .await
                .map_err(|e| {
                    error!(error = %e, chat = %chat_id, name = %upload.name, "Attachment upload failed");
                    ChatError::Attachment(e)
                })?;
            attachments.push(Attachment {
                kind: upload.kind.clone(),
                url,
                name: upload.name.clone(),
            });
        }

        let message_id = MessageId::random();
        let message = Message {
            id: message_id.clone(),
            chat_id: chat_id.clone(),
            sender: sender.clone(),
            text: draft.text.clone(),
            attachments,
            timestamp: None,
            read_by: vec![sender.clone()],
        };

        let mut batch = WriteBatch::new();
        batch.create(MESSAGES, message_id.as_str(), &message)?;
        batch.update(
            MESSAGES,
            message_id.as_str(),
            vec![("timestamp".into(), FieldOp::ServerTimestamp)],
        );
        batch.update(
            CHATS,
            chat_id.as_str(),
            vec![
                (
                    "last_message".into(),
                    FieldOp::Set(json!({
                        "text": draft.text.clone().unwrap_or_default(),
                        "sender": sender.as_str(),
                    })),
                ),
                ("last_message.timestamp".into(), FieldOp::ServerTimestamp),
                ("updated_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        for participant in chat.participants.iter().filter(|p| *p != sender) {
            // Index documents are created lazily, so a participant without
            // one gets a fresh index rather than failing the batch.
            if self.store.get(USER_CHATS, participant.as_str()).await.is_some() {
                batch.update(
                    USER_CHATS,
                    participant.as_str(),
                    vec![(format!("unread.{chat_id}"), FieldOp::Increment(1))],
                );
            } else {
                let mut index = UserChats::default();
                index.chat_ids.push(chat_id.clone());
                index.unread.insert(chat_id.clone(), 1);
                batch.set_merge(USER_CHATS, participant.as_str(), &index)?;
            }
        }

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(message = %message_id, chat = %chat_id, "Message sent");
                Ok(message_id)
            }
            // The chat vanished between the read and the commit.
            Err(StoreError::NotFound) => Err(ChatError::ChatNotFound),
            Err(e) => {
                error!(error = %e, chat = %chat_id, "Failed to send message");
                Err(e.into())
            }
        }
    }

    /// One-shot page of a chat's messages, newest first, optionally
    /// resuming after a previously returned message id.
    pub async fn messages(
        &self,
        chat_id: &ChatId,
        limit: usize,
        start_after: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let mut query = Query::collection(MESSAGES)
            .where_eq("chat_id", chat_id.as_str())
            .order_by("timestamp", Direction::Descending)
            .limit(limit);
        if let Some(cursor) = start_after {
            query = query.start_after(cursor.as_str());
        }

        self.store
            .query(&query)
            .await
            .iter()
            .map(|doc| doc.deserialize::<Message>().map_err(ChatError::from))
            .collect()
    }

    /// Mark the newest messages of a chat as read by `user`.
    ///
    /// Scans the most recent `read_scan_limit` messages and array-unions the
    /// user into `read_by` wherever missing; when at least one message was
    /// updated, the user's unread counter for the chat resets to 0 in the
    /// same batch.  When nothing needed updating, no write happens at all —
    /// send-time bookkeeping already keeps the counter at 0 in that case.
    /// Returns the number of messages updated.
    pub async fn mark_read(&self, chat_id: &ChatId, user: &UserId) -> Result<usize> {
        let query = Query::collection(MESSAGES)
            .where_eq("chat_id", chat_id.as_str())
            .order_by("timestamp", Direction::Descending)
            .limit(self.config.read_scan_limit);
        let docs = self.store.query(&query).await;

        let mut batch = WriteBatch::new();
        let mut updated = 0usize;
        for doc in &docs {
            let message: Message = doc.deserialize()?;
            if !message.read_by.contains(user) {
                batch.update(
                    MESSAGES,
                    doc.id.as_str(),
                    vec![(
                        "read_by".into(),
                        FieldOp::ArrayUnion(vec![Value::String(user.as_str().to_string())]),
                    )],
                );
                updated += 1;
            }
        }

        if updated == 0 {
            return Ok(0);
        }

        // Reset the counter only when the index exists; a non-participant
        // reader has no counter to reset.
        if let Some(doc) = self.store.get(USER_CHATS, user.as_str()).await {
            let index: UserChats = doc.deserialize()?;
            if index.unread.contains_key(chat_id) {
                batch.update(
                    USER_CHATS,
                    user.as_str(),
                    vec![(format!("unread.{chat_id}"), FieldOp::Set(json!(0)))],
                );
            }
        }

        self.store.commit(batch).await?;
        debug!(chat = %chat_id, user = %user, updated, "Marked messages read");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ChatDirectory;
    use crate::models::AttachmentUpload;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<DocStore>,
        directory: ChatDirectory,
        log: MessageLog,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(DocStore::new());
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(
            BlobStore::new(dir.path().to_path_buf(), 1024)
                .await
                .unwrap(),
        );
        Fixture {
            directory: ChatDirectory::new(Arc::clone(&store)),
            log: MessageLog::new(Arc::clone(&store), blobs, ChatConfig::default()),
            store,
            _dir: dir,
        }
    }

    fn users() -> (UserId, UserId) {
        (UserId::new("u1"), UserId::new("u2"))
    }

    #[tokio::test]
    async fn send_updates_unread_and_last_message() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        f.log
            .send(&chat_id, &u1, MessageDraft::text("hi"))
            .await
            .unwrap();

        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 1);
        assert_eq!(f.directory.unread_count(&u1, &chat_id).await.unwrap(), 0);

        let chat: Chat = f
            .store
            .get(CHATS, chat_id.as_str())
            .await
            .unwrap()
            .deserialize()
            .unwrap();
        let last = chat.last_message.unwrap();
        assert_eq!(last.text, "hi");
        assert_eq!(last.sender, u1);
        // The denormalized snapshot and the chat metadata share one
        // server timestamp.
        assert_eq!(last.timestamp, chat.updated_at);
    }

    #[tokio::test]
    async fn unread_accumulates_per_send() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        for text in ["one", "two", "three"] {
            f.log
                .send(&chat_id, &u1, MessageDraft::text(text))
                .await
                .unwrap();
        }
        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 3);
        assert_eq!(f.directory.unread_count(&u1, &chat_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn send_recreates_a_missing_participant_index() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        // Simulate an index lost (or never created) for one participant.
        f.store.delete(USER_CHATS, u2.as_str()).await.unwrap();

        f.log
            .send(&chat_id, &u1, MessageDraft::text("hi"))
            .await
            .unwrap();

        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 1);
        let chats = f.directory.user_chats(&u2).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, chat_id);
    }

    #[tokio::test]
    async fn send_to_missing_chat_fails() {
        let f = fixture().await;
        let (u1, _) = users();
        let err = f
            .log
            .send(&ChatId::new("nope"), &u1, MessageDraft::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ChatNotFound));
    }

    #[tokio::test]
    async fn message_seeds_read_by_with_sender() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        f.log
            .send(&chat_id, &u1, MessageDraft::text("hi"))
            .await
            .unwrap();
        let page = f.log.messages(&chat_id, 10, None).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].read_by, vec![u1]);
        assert!(page[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn pagination_resumes_after_cursor() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        let mut sent = Vec::new();
        for text in ["a", "b", "c", "d"] {
            sent.push(f.log.send(&chat_id, &u1, MessageDraft::text(text)).await.unwrap());
            // Distinct timestamps keep the newest-first order unambiguous.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let first = f.log.messages(&chat_id, 2, None).await.unwrap();
        assert_eq!(first[0].text.as_deref(), Some("d"));
        assert_eq!(first[1].text.as_deref(), Some("c"));

        let rest = f
            .log
            .messages(&chat_id, 10, Some(&first[1].id))
            .await
            .unwrap();
        assert_eq!(rest[0].text.as_deref(), Some("b"));
        assert_eq!(rest[1].text.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn mark_read_is_monotone_and_resets_unread() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        f.log.send(&chat_id, &u1, MessageDraft::text("hi")).await.unwrap();
        f.log.send(&chat_id, &u1, MessageDraft::text("there")).await.unwrap();
        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 2);

        let updated = f.log.mark_read(&chat_id, &u2).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 0);

        for message in f.log.messages(&chat_id, 10, None).await.unwrap() {
            assert!(message.read_by.contains(&u1));
            assert!(message.read_by.contains(&u2));
            assert_eq!(message.read_by.len(), 2);
        }

        // Repeated call: nothing to update, no duplicates, no writes.
        let updated = f.log.mark_read(&chat_id, &u2).await.unwrap();
        assert_eq!(updated, 0);
        for message in f.log.messages(&chat_id, 10, None).await.unwrap() {
            assert_eq!(message.read_by.len(), 2);
        }
    }

    #[tokio::test]
    async fn attachment_upload_precedes_persistence() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        let draft = MessageDraft::text("see attached").with_upload(AttachmentUpload {
            kind: "application/pdf".to_string(),
            name: "draft.pdf".to_string(),
            bytes: b"pdf-bytes".to_vec(),
        });
        f.log.send(&chat_id, &u1, draft).await.unwrap();

        let page = f.log.messages(&chat_id, 10, None).await.unwrap();
        let attachment = &page[0].attachments[0];
        assert!(attachment.url.starts_with("blob:/chats/u1_u2/"));
        assert_eq!(attachment.name, "draft.pdf");
    }

    #[tokio::test]
    async fn failed_upload_aborts_the_whole_send() {
        let f = fixture().await;
        let (u1, u2) = users();
        let chat_id = f.directory.create_direct_chat(&u1, &u2).await.unwrap();

        // Over the 1 KiB cap of the test blob store.
        let draft = MessageDraft::text("too big").with_upload(AttachmentUpload {
            kind: "application/octet-stream".to_string(),
            name: "huge.bin".to_string(),
            bytes: vec![0u8; 4096],
        });
        let err = f.log.send(&chat_id, &u1, draft).await.unwrap_err();
        assert!(matches!(err, ChatError::Attachment(_)));

        // No partial state: no message, unread untouched, last_message unset.
        assert!(f.log.messages(&chat_id, 10, None).await.unwrap().is_empty());
        assert_eq!(f.directory.unread_count(&u2, &chat_id).await.unwrap(), 0);
        let chat: Chat = f
            .store
            .get(CHATS, chat_id.as_str())
            .await
            .unwrap()
            .deserialize()
            .unwrap();
        assert!(chat.last_message.is_none());
    }
}
