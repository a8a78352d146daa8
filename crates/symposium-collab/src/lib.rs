//! # symposium-collab
//!
//! Collaboration workflows of the Symposium platform:
//!
//! - [`Dispatcher`] — template-based notification fan-out with a live
//!   unread-count subscription;
//! - [`CollabDirectory`] — invitation and peer-review lifecycles layered on
//!   the same document-store primitives as the chat directory, including
//!   the denormalized reviewer summaries kept on project documents.

pub mod models;
pub mod notify;

mod directory;
mod error;
mod invites;
mod reviews;

pub use directory::CollabDirectory;
pub use error::{CollabError, Result};
pub use models::*;
pub use notify::{DispatchOutcome, Dispatcher, NotifyRequest, SkipReason};

/// Collection names shared by the collaboration components.
pub(crate) mod collections {
    pub const PROJECTS: &str = "projects";
    pub const INVITATIONS: &str = "invitations";
    pub const REVIEW_REQUESTS: &str = "review_requests";
    pub const NOTIFICATIONS: &str = "notifications";
}
