//! Domain models persisted as chat-layer documents.
//!
//! Every struct derives `Serialize`/`Deserialize` and round-trips through a
//! store document.  Timestamp fields are optional because they are assigned
//! server-side at commit time; a document read between creation and the
//! timestamp resolving (or a dangling partial write) must still deserialize.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use symposium_shared::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Whether a chat is a two-party direct chat or a named group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
}

/// Denormalized snapshot of the newest message, kept on the chat document
/// so chat lists render without a per-chat message query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastMessage {
    pub text: String,
    pub sender: UserId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A conversation record (direct or group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub participants: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

// ---------------------------------------------------------------------------
// UserChats index
// ---------------------------------------------------------------------------

/// Per-user record of chat membership and per-chat unread counters.
/// Created lazily on the first chat involving the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserChats {
    #[serde(default)]
    pub chat_ids: Vec<ChatId>,
    #[serde(default)]
    pub unread: BTreeMap<ChatId, i64>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored attachment reference: uploaded bytes live in the blob store,
/// the message carries only the retrieval URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub kind: String,
    pub url: String,
    pub name: String,
}

/// A single chat message.  Immutable once created, except for `read_by`,
/// which only grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_by: Vec<UserId>,
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// An attachment before upload: the raw bytes plus their metadata.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub kind: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The caller-supplied content of an outgoing message.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub text: Option<String>,
    pub uploads: Vec<AttachmentUpload>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            uploads: Vec::new(),
        }
    }

    pub fn with_upload(mut self, upload: AttachmentUpload) -> Self {
        self.uploads.push(upload);
        self
    }
}

/// Sort chats newest-activity-first; chats that never saw activity (no
/// `updated_at`) sort as epoch and land at the end.
pub(crate) fn sort_newest_first(chats: &mut [Chat]) {
    chats.sort_by_key(|chat| {
        std::cmp::Reverse(chat.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    });
}
