//! Peer-review lifecycle: `pending -> accepted | rejected`, then
//! `accepted -> completed` once feedback is submitted.
//!
//! Accepting a request also upserts a denormalized reviewer summary into
//! the project document.  The summaries live in a map keyed by reviewer
//! id, so upserts for different reviewers touch disjoint fields and cannot
//! lose each other's updates.

use serde_json::Value;
use tracing::{debug, info};

use symposium_shared::{ProjectId, UserId};
use symposium_store::{FieldOp, Query, StoreError, WriteBatch};

use crate::collections::{PROJECTS, REVIEW_REQUESTS};
use crate::directory::CollabDirectory;
use crate::error::{CollabError, Result};
use crate::models::{Project, ReviewRequest, ReviewStatus, ReviewerInfo, ReviewerSummary};

impl CollabDirectory {
    /// Ask a user to review a project.  Same conditional-put discipline as
    /// [`invite`](Self::invite): a live prior request fails with
    /// `AlreadyRequested`, a rejected one is replaced.
    pub async fn request_review(&self, project: &ProjectId, reviewer: &UserId) -> Result<()> {
        self.require_project(project).await?;
        let id = Self::pair_id(project, reviewer);

        let request = ReviewRequest {
            project: project.clone(),
            reviewer: reviewer.clone(),
            status: ReviewStatus::Pending,
            created_at: None,
            responded_at: None,
            completed_at: None,
        };

        let mut batch = WriteBatch::new();
        batch.create(REVIEW_REQUESTS, &id, &request)?;
        batch.update(
            REVIEW_REQUESTS,
            &id,
            vec![("created_at".into(), FieldOp::ServerTimestamp)],
        );

        match self.store.commit(batch).await {
            Ok(()) => {
                info!(project = %project, reviewer = %reviewer, "Sent review request");
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => {
                let existing: ReviewRequest = self
                    .store
                    .get_required(REVIEW_REQUESTS, &id)
                    .await?
                    .deserialize()?;
                if existing.status.is_live() {
                    return Err(CollabError::AlreadyRequested);
                }
                let mut batch = WriteBatch::new();
                batch.set(REVIEW_REQUESTS, &id, &request)?;
                batch.update(
                    REVIEW_REQUESTS,
                    &id,
                    vec![("created_at".into(), FieldOp::ServerTimestamp)],
                );
                self.store.commit(batch).await?;
                info!(project = %project, reviewer = %reviewer, "Re-sent rejected review request");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The review request for a (project, reviewer) pair, if any.
    pub async fn review_request(
        &self,
        project: &ProjectId,
        reviewer: &UserId,
    ) -> Result<Option<ReviewRequest>> {
        let id = Self::pair_id(project, reviewer);
        match self.store.get(REVIEW_REQUESTS, &id).await {
            Some(doc) => Ok(Some(doc.deserialize()?)),
            None => Ok(None),
        }
    }

    /// All pending review requests addressed to a reviewer.
    pub async fn pending_reviews(&self, reviewer: &UserId) -> Result<Vec<ReviewRequest>> {
        let query = Query::collection(REVIEW_REQUESTS)
            .where_eq("reviewer", reviewer.as_str())
            .where_eq("status", "pending");
        self.store
            .query(&query)
            .await
            .iter()
            .map(|doc| doc.deserialize::<ReviewRequest>().map_err(CollabError::from))
            .collect()
    }

    /// Accept a pending review request.  In the same batch, upsert the
    /// reviewer's denormalized summary onto the project document.
    pub async fn accept_review(&self, project: &ProjectId, info: &ReviewerInfo) -> Result<()> {
        let request = self.pending_request(project, &info.id).await?;
        let id = Self::pair_id(project, &request.reviewer);

        let summary = ReviewerSummary {
            id: info.id.clone(),
            name: info.name.clone(),
            field: info.field.clone(),
            review_status: ReviewStatus::Accepted,
        };

        let mut batch = WriteBatch::new();
        batch.update(
            REVIEW_REQUESTS,
            &id,
            vec![
                ("status".into(), FieldOp::Set(Value::String("accepted".into()))),
                ("responded_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        batch.update(
            PROJECTS,
            project.as_str(),
            vec![(
                format!("reviewers.{}", info.id),
                FieldOp::Set(serde_json::to_value(&summary)?),
            )],
        );
        self.store.commit(batch).await?;

        info!(project = %project, reviewer = %info.id, "Review request accepted");
        Ok(())
    }

    /// Reject a pending review request.
    pub async fn decline_review(&self, project: &ProjectId, reviewer: &UserId) -> Result<()> {
        let request = self.pending_request(project, reviewer).await?;
        let id = Self::pair_id(project, &request.reviewer);

        self.store
            .update(
                REVIEW_REQUESTS,
                &id,
                vec![
                    ("status".into(), FieldOp::Set(Value::String("rejected".into()))),
                    ("responded_at".into(), FieldOp::ServerTimestamp),
                ],
            )
            .await?;

        debug!(project = %project, reviewer = %reviewer, "Review request rejected");
        Ok(())
    }

    /// Mark an accepted review as completed (feedback submitted), flipping
    /// both the request and the project's denormalized entry.
    pub async fn complete_review(&self, project: &ProjectId, reviewer: &UserId) -> Result<()> {
        let id = Self::pair_id(project, reviewer);
        let request: ReviewRequest = self
            .store
            .get(REVIEW_REQUESTS, &id)
            .await
            .ok_or(CollabError::ReviewNotFound)?
            .deserialize()?;
        if request.status != ReviewStatus::Accepted {
            return Err(CollabError::InvalidStatus(format!("{:?}", request.status)));
        }

        let mut batch = WriteBatch::new();
        batch.update(
            REVIEW_REQUESTS,
            &id,
            vec![
                ("status".into(), FieldOp::Set(Value::String("completed".into()))),
                ("completed_at".into(), FieldOp::ServerTimestamp),
            ],
        );
        batch.update(
            PROJECTS,
            project.as_str(),
            vec![(
                format!("reviewers.{reviewer}.review_status"),
                FieldOp::Set(Value::String("completed".into())),
            )],
        );
        self.store.commit(batch).await?;

        info!(project = %project, reviewer = %reviewer, "Review completed");
        Ok(())
    }

    /// Re-sync a reviewer's denormalized name/field on a project after the
    /// source profile changed.  Returns `false` when the project has no
    /// entry for this reviewer (nothing to refresh).
    pub async fn refresh_reviewer_info(
        &self,
        project: &ProjectId,
        info: &ReviewerInfo,
    ) -> Result<bool> {
        let current: Project = self.require_project(project).await?.deserialize()?;
        if !current.reviewers.contains_key(info.id.as_str()) {
            return Ok(false);
        }

        self.store
            .update(
                PROJECTS,
                project.as_str(),
                vec![
                    (
                        format!("reviewers.{}.name", info.id),
                        FieldOp::Set(Value::String(info.name.clone())),
                    ),
                    (
                        format!("reviewers.{}.field", info.id),
                        FieldOp::Set(Value::String(info.field.clone())),
                    ),
                ],
            )
            .await?;

        debug!(project = %project, reviewer = %info.id, "Refreshed reviewer info");
        Ok(true)
    }

    async fn pending_request(
        &self,
        project: &ProjectId,
        reviewer: &UserId,
    ) -> Result<ReviewRequest> {
        let id = Self::pair_id(project, reviewer);
        let request: ReviewRequest = self
            .store
            .get(REVIEW_REQUESTS, &id)
            .await
            .ok_or(CollabError::ReviewNotFound)?
            .deserialize()?;
        if request.status != ReviewStatus::Pending {
            return Err(CollabError::InvalidStatus(format!("{:?}", request.status)));
        }
        Ok(request)
    }
}
