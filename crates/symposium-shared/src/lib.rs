//! # symposium-shared
//!
//! Identifiers and cross-crate plumbing for the Symposium collaboration
//! platform.  Every other crate in the workspace depends on the id newtypes
//! defined here; keeping them in one place guarantees that a `ChatId` minted
//! by the chat directory is the same type the realtime layer watches.

pub mod logging;
pub mod types;

pub use types::{ChatId, MessageId, NotificationId, ProjectId, UserId};
