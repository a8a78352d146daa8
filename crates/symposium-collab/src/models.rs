//! Domain models for invitations, review requests, and notifications.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use symposium_shared::{NotificationId, ProjectId, UserId};

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    /// A live invitation blocks a new one for the same (project, invitee)
    /// pair; a declined one does not.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }
}

/// A collaboration invitation for one (project, invitee) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invitation {
    pub project: ProjectId,
    pub invitee: UserId,
    pub status: InvitationStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Review requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl ReviewStatus {
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// A peer-review request for one (project, reviewer) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRequest {
    pub project: ProjectId,
    pub reviewer: UserId,
    pub status: ReviewStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Reviewer profile fields denormalized onto project documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewerInfo {
    pub id: UserId,
    pub name: String,
    pub field: String,
}

/// The denormalized per-reviewer entry on a project document.  Kept in a
/// map keyed by reviewer id so concurrent upserts touch disjoint fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewerSummary {
    pub id: UserId,
    pub name: String,
    pub field: String,
    pub review_status: ReviewStatus,
}

/// The slice of a project document this layer reads and maintains.
/// Project CRUD itself lives outside this layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub title: String,
    #[serde(default)]
    pub collaborators: Vec<UserId>,
    #[serde(default)]
    pub reviewers: BTreeMap<String, ReviewerSummary>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A persisted notification record.  The timestamp is client-assigned at
/// dispatch time, not a server timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub user: UserId,
    pub project: ProjectId,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read_status: bool,
}
