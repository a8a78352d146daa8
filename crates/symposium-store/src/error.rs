use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document or blob that was expected to exist does not.
    #[error("Record not found")]
    NotFound,

    /// A create-if-absent write found the target id already taken.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// Document payload (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic I/O error from the blob backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob exceeds the configured size cap.
    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    /// Blob key contains path traversal or other forbidden components.
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    /// Catch-all for store faults that have no more specific kind.
    #[error("Store error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
