//! The collaboration directory handle.  Invitation operations live in
//! `invites.rs`, review operations in `reviews.rs`; both are `impl` blocks
//! on this struct.

use std::sync::Arc;

use symposium_shared::{ProjectId, UserId};
use symposium_store::{DocStore, Document};

use crate::collections::PROJECTS;
use crate::error::{CollabError, Result};
use crate::models::Project;

/// Directory of invitations and review requests, plus the denormalized
/// reviewer summaries it maintains on project documents.
pub struct CollabDirectory {
    pub(crate) store: Arc<DocStore>,
}

impl CollabDirectory {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }

    /// Deterministic id for a (project, subject) record: at most one
    /// document per pair can ever exist, which is what closes the
    /// concurrent duplicate-creation window.
    pub(crate) fn pair_id(project: &ProjectId, subject: &UserId) -> String {
        format!("{project}_{subject}")
    }

    pub(crate) async fn require_project(&self, project: &ProjectId) -> Result<Document> {
        self.store
            .get(PROJECTS, project.as_str())
            .await
            .ok_or(CollabError::ProjectNotFound)
    }

    /// The project slice this layer maintains.
    pub async fn project(&self, project: &ProjectId) -> Result<Project> {
        Ok(self.require_project(project).await?.deserialize()?)
    }
}
