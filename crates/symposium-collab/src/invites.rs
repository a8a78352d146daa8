//! Invitation lifecycle: `pending -> accepted | declined`.

use serde_json::Value;
use tracing::{debug, info};

use symposium_shared::{ProjectId, UserId};
use symposium_store::{FieldOp, Query, StoreError, WriteBatch};

use crate::collections::{INVITATIONS, PROJECTS};
use crate::directory::CollabDirectory;
use crate::error::{CollabError, Result};
use crate::models::{Invitation, InvitationStatus};

impl CollabDirectory {
    /// Invite a user to collaborate on a project.
    ///
    /// Create-if-absent on the deterministic `<project>_<invitee>` id: a
    /// live prior invitation fails with `AlreadyInvited`; a declined one is
    /// replaced by the new invitation.
    pub async fn invite(&self, project: &ProjectId, invitee: &UserId) -> Result<()> {
        self.require_project(project).await?;
        let id = Self::pair_id(project, invitee);

        let invitation = Invitation {
            project: project.clone(),
            invitee: invitee.clone(),
            status: InvitationStatus::Pending,
            created_at: None,
            responded_at: None,
        };

        let mut batch = WriteBatch::new();
        batch.create(INVITATIONS, &id, &invitation)?;
        batch.update(
            INVITATIONS,
            &id,
            vec![("created_at".into(), FieldOp::ServerTimestamp)],
        );

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(project = %project, invitee = %invitee, "Sent invitation");
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                let existing: Invitation =
                    self.store.get_required(INVITATIONS, &id).await?.deserialize()?;
                if existing.status.is_live() {
                    return Err(CollabError::AlreadyInvited);
                }
                // Declined earlier; replace with a fresh pending invitation.
                let mut batch = WriteBatch::new();
                batch.set(INVITATIONS, &id, &invitation)?;
                batch.update(
                    INVITATIONS,
                    &id,
                    vec![("created_at".into(), FieldOp::ServerTimestamp)],
                );
                self.store.commit(batch).await?;
                info!(project = %project, invitee = %invitee, "Re-sent declined invitation");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The invitation for a (project, invitee) pair, if any.
    pub async fn invitation(
        &self,
        project: &ProjectId,
        invitee: &UserId,
    ) -> Result<Option<Invitation>> {
        let id = Self::pair_id(project, invitee);
        match self.store.get(INVITATIONS, &id).await {
            Some(doc) => Ok(Some(doc.deserialize()?)),
            None => Ok(None),
        }
    }

    /// All pending invitations addressed to a user.
    pub async fn pending_invitations(&self, invitee: &UserId) -> Result<Vec<Invitation>> {
        let query = Query::collection(INVITATIONS)
            .where_eq("invitee", invitee.as_str())
            .where_eq("status", "pending");
        self.store
            .query(&query)
            .await
            .iter()
            .map(|doc| doc.deserialize::<Invitation>().map_err(CollabError::from))
            .collect()
    }

    /// Accept or decline a pending invitation.  Accepting also unions the
    /// invitee into the project's collaborator list in the same batch.
    pub async fn respond(
        &self,
        project: &ProjectId,
        invitee: &UserId,
        accept: bool,
    ) -> Result<()> {
        let id = Self::pair_id(project, invitee);
        let invitation: Invitation = self
            .store
            .get(INVITATIONS, &id)
            .await
            .ok_or(CollabError::InvitationNotFound)?
            .deserialize()?;
        if invitation.status != InvitationStatus::Pending {
            return Err(CollabError::InvalidStatus(format!("{:?}", invitation.status)));
        }

        let status = if accept { "accepted" } else { "declined" };
        let mut batch = WriteBatch::new();
        batch.update(
            INVITATIONS,
            &id,
            vec![
                ("status".into(), FieldOp::Set(Value::String(status.into()))),
                ("responded_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        if accept {
            batch.update(
                PROJECTS,
                project.as_str(),
                vec![(
                    "collaborators".into(),
                    FieldOp::ArrayUnion(vec![Value::String(invitee.as_str().to_string())]),
                )],
            );
        }
        self.store.commit(batch).await?;

        debug!(project = %project, invitee = %invitee, status, "Invitation resolved");
        Ok(())
    }
}
