use symposium_store::StoreError;
use thiserror::Error;

/// Errors produced by the collaboration layer.
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("Project not found")]
    ProjectNotFound,

    #[error("Invitation not found")]
    InvitationNotFound,

    #[error("Review request not found")]
    ReviewNotFound,

    /// A live (pending or accepted) invitation already exists for the pair.
    #[error("An invitation for this user is already active")]
    AlreadyInvited,

    /// A live review request already exists for the pair.
    #[error("A review request for this reviewer is already active")]
    AlreadyRequested,

    /// The record is not in the state the operation requires.
    #[error("Operation not allowed in status {0}")]
    InvalidStatus(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for CollabError {
    fn from(e: serde_json::Error) -> Self {
        CollabError::Store(StoreError::Serde(e))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollabError>;
