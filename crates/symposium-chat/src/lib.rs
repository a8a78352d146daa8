//! # symposium-chat
//!
//! The chat data-flow layer of the Symposium collaboration platform:
//!
//! - [`ChatDirectory`] — direct/group chat creation, membership, and the
//!   per-user chat index with unread counters;
//! - [`MessageLog`] — append-only messages with attachments and read
//!   receipts;
//! - [`ChatLive`] — realtime fan-out: live message pages, single-chat
//!   views, and the resolved per-user chat list.
//!
//! All three are thin orchestrations over an injected
//! [`DocStore`](symposium_store::DocStore) handle; the store's write
//! batches are the only atomicity primitive, and its watch channels are
//! the only push primitive.

pub mod config;
pub mod directory;
pub mod live;
pub mod log;
pub mod models;

mod error;

pub use config::ChatConfig;
pub use directory::{ChatDirectory, DirectoryOptions, GroupUpdate};
pub use error::{ChatError, Result};
pub use live::ChatLive;
pub use log::MessageLog;
pub use models::*;

/// Collection names shared by the chat components.
pub(crate) mod collections {
    pub const CHATS: &str = "chats";
    pub const USER_CHATS: &str = "user_chats";
    pub const MESSAGES: &str = "messages";
    pub const USERS: &str = "users";
}
