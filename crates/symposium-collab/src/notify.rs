//! Template-based notification fan-out.
//!
//! Dispatch is best-effort: a malformed request (unknown kind, missing
//! project or target) is logged and reported as a skipped outcome, never
//! as an error.  Notification delivery must not fail the workflow that
//! triggered it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use symposium_shared::{NotificationId, ProjectId, UserId};
use symposium_store::{Direction, DocStore, Document, FieldOp, Query, Subscription};

use crate::collections::NOTIFICATIONS;
use crate::error::Result;
use crate::models::Notification;

/// A request to notify one user about one project event.
#[derive(Debug, Clone, Default)]
pub struct NotifyRequest {
    pub kind: String,
    pub project_id: Option<ProjectId>,
    pub target_user: Option<UserId>,
    /// Template arguments; missing keys render with a generic fallback.
    pub args: HashMap<String, String>,
}

impl NotifyRequest {
    pub fn new(kind: impl Into<String>, project: &ProjectId, target: &UserId) -> Self {
        Self {
            kind: kind.into(),
            project_id: Some(project.clone()),
            target_user: Some(target.clone()),
            args: HashMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// What became of a dispatch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A notification document was written.
    Delivered(NotificationId),
    /// Nothing was written; the reason says why.
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownKind,
    MissingProject,
    MissingTarget,
    StoreFailure,
}

/// Renders and persists notifications, and serves live unread counts.
pub struct Dispatcher {
    store: Arc<DocStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }

    /// Render the template for `request.kind` and persist one notification
    /// for the target user.  Returns [`DispatchOutcome::Skipped`] instead of
    /// an error for anything that prevents delivery.
    pub async fn dispatch(&self, request: NotifyRequest) -> DispatchOutcome {
        let Some(message) = render(&request.kind, &request.args) else {
            warn!(kind = %request.kind, "Dropping notification of unknown kind");
            return DispatchOutcome::Skipped(SkipReason::UnknownKind);
        };
        let Some(project) = request.project_id else {
            warn!(kind = %request.kind, "Dropping notification without a project");
            return DispatchOutcome::Skipped(SkipReason::MissingProject);
        };
        let Some(user) = request.target_user else {
            warn!(kind = %request.kind, project = %project, "Dropping notification without a target");
            return DispatchOutcome::Skipped(SkipReason::MissingTarget);
        };

        let notification = Notification {
            id: NotificationId::random(),
            user,
            project,
            kind: request.kind,
            message,
            timestamp: Utc::now(),
            read_status: false,
        };

        match self
            .store
            .set(NOTIFICATIONS, notification.id.as_str(), &notification)
            .await
        {
            Ok(()) => {
                debug!(
                    id = %notification.id,
                    user = %notification.user,
                    kind = %notification.kind,
                    "Delivered notification"
                );
                DispatchOutcome::Delivered(notification.id)
            }
            Err(e) => {
                warn!(kind = %notification.kind, error = %e, "Failed to persist notification");
                DispatchOutcome::Skipped(SkipReason::StoreFailure)
            }
        }
    }

    /// A user's notifications, newest first.
    pub async fn notifications(&self, user: &UserId) -> Result<Vec<Notification>> {
        let query = Query::collection(NOTIFICATIONS)
            .where_eq("user", user.as_str())
            .order_by("timestamp", Direction::Descending);
        self.store
            .query(&query)
            .await
            .iter()
            .map(|doc| doc.deserialize::<Notification>().map_err(Into::into))
            .collect()
    }

    /// Flip one notification to read.
    pub async fn mark_notification_read(&self, id: &NotificationId) -> Result<()> {
        self.store
            .update(
                NOTIFICATIONS,
                id.as_str(),
                vec![("read_status".into(), FieldOp::Set(Value::Bool(true)))],
            )
            .await?;
        Ok(())
    }

    /// Live count of a user's unread notifications.
    pub async fn watch_unread_count(&self, user: &UserId) -> Subscription<usize> {
        let query = Query::collection(NOTIFICATIONS)
            .where_eq("user", user.as_str())
            .where_eq("read_status", false);
        let mut inner = self.store.watch_query(query).await;

        let (tx, rx) = watch::channel(count(&inner.current()));
        let task = tokio::spawn(async move {
            while inner.changed().await {
                if tx.send(count(&inner.current())).is_err() {
                    break;
                }
            }
        });
        Subscription::from_parts(rx, task)
    }
}

fn count(docs: &[Document]) -> usize {
    docs.len()
}

/// Render the message for a notification kind, or `None` for an unknown
/// kind.  Every template degrades gracefully when an argument is missing.
fn render(kind: &str, args: &HashMap<String, String>) -> Option<String> {
    let arg = |key: &str, fallback: &str| -> String {
        args.get(key).cloned().unwrap_or_else(|| fallback.to_string())
    };
    let actor = || arg("actor", "A collaborator");
    let project = || arg("project", "your project");

    let message = match kind {
        "invitation_received" => {
            format!("{} invited you to collaborate on {}", actor(), project())
        }
        "invitation_accepted" => {
            format!("{} accepted your invitation to {}", actor(), project())
        }
        "invitation_declined" => {
            format!("{} declined your invitation to {}", actor(), project())
        }
        "review_requested" => {
            format!("{} requested your review of {}", actor(), project())
        }
        "review_accepted" => {
            format!("{} agreed to review {}", actor(), project())
        }
        "review_completed" => {
            format!("{} submitted a review of {}", actor(), project())
        }
        "funding_added" => {
            format!(
                "{} was added as a funding source for {}",
                arg("source", "A new source"),
                project()
            )
        }
        "document_uploaded" => {
            format!(
                "{} uploaded {} to {}",
                actor(),
                arg("document", "a document"),
                project()
            )
        }
        _ => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(DocStore::new()))
    }

    #[tokio::test]
    async fn delivered_notification_is_persisted_unread() {
        let d = dispatcher();
        let user = UserId::new("u1");
        let request = NotifyRequest::new("invitation_received", &ProjectId::new("p1"), &user)
            .arg("actor", "Ada")
            .arg("project", "Coral genomics");

        let outcome = d.dispatch(request).await;
        let DispatchOutcome::Delivered(id) = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };

        let list = d.notifications(&user).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, id);
        assert_eq!(
            list[0].message,
            "Ada invited you to collaborate on Coral genomics"
        );
        assert!(!list[0].read_status);
    }

    #[tokio::test]
    async fn unknown_kind_is_skipped_without_a_write() {
        let d = dispatcher();
        let user = UserId::new("u1");
        let request = NotifyRequest::new("grant_expired", &ProjectId::new("p1"), &user);

        let outcome = d.dispatch(request).await;
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::UnknownKind));
        assert!(d.notifications(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_project_or_target_is_skipped() {
        let d = dispatcher();
        let (p, u) = (ProjectId::new("p1"), UserId::new("u1"));

        let mut request = NotifyRequest::new("review_requested", &p, &u);
        request.project_id = None;
        assert_eq!(
            d.dispatch(request).await,
            DispatchOutcome::Skipped(SkipReason::MissingProject)
        );

        let mut request = NotifyRequest::new("review_requested", &p, &u);
        request.target_user = None;
        assert_eq!(
            d.dispatch(request).await,
            DispatchOutcome::Skipped(SkipReason::MissingTarget)
        );
    }

    #[test]
    fn templates_fall_back_on_missing_args() {
        let message = render("review_completed", &HashMap::new()).unwrap();
        assert_eq!(message, "A collaborator submitted a review of your project");
    }

    #[tokio::test]
    async fn notifications_list_newest_first() {
        let d = dispatcher();
        let (p, u) = (ProjectId::new("p1"), UserId::new("u1"));

        d.dispatch(NotifyRequest::new("invitation_received", &p, &u).arg("actor", "Ada"))
            .await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        d.dispatch(NotifyRequest::new("review_requested", &p, &u).arg("actor", "Grace"))
            .await;

        let list = d.notifications(&u).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind, "review_requested");
        assert_eq!(list[1].kind, "invitation_received");
    }

    #[tokio::test]
    async fn unread_count_tracks_delivery_and_reads() {
        let d = dispatcher();
        let (p, u) = (ProjectId::new("p1"), UserId::new("u1"));

        let mut sub = d.watch_unread_count(&u).await;
        assert_eq!(sub.current(), 0);

        let DispatchOutcome::Delivered(id) =
            d.dispatch(NotifyRequest::new("funding_added", &p, &u)).await
        else {
            panic!("expected delivery");
        };
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert_eq!(sub.current(), 1);

        d.mark_notification_read(&id).await.unwrap();
        assert!(timeout(WAIT, sub.changed()).await.unwrap());
        assert_eq!(sub.current(), 0);
    }

    #[tokio::test]
    async fn counts_are_scoped_per_user() {
        let d = dispatcher();
        let p = ProjectId::new("p1");
        let (u1, u2) = (UserId::new("u1"), UserId::new("u2"));

        d.dispatch(NotifyRequest::new("document_uploaded", &p, &u1)).await;

        let sub = d.watch_unread_count(&u2).await;
        assert_eq!(sub.current(), 0);
        assert_eq!(d.notifications(&u1).await.unwrap().len(), 1);
    }
}
