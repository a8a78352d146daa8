use symposium_shared::UserId;
use symposium_store::StoreError;
use thiserror::Error;

/// Errors produced by the chat layer.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The referenced chat does not exist.
    #[error("Chat not found")]
    ChatNotFound,

    /// A participant id did not resolve to a user profile (only raised when
    /// participant validation is enabled).
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// A group-only operation was invoked against a direct chat.
    #[error("Not a group chat")]
    NotGroupChat,

    /// An attachment upload failed; the message was not sent.
    #[error("Attachment upload failed: {0}")]
    Attachment(#[source] StoreError),

    /// Underlying store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
