//! Activity recording and notification fan-out.
//!
//! Both entry points return immediately; the work runs under the
//! [`TaskSupervisor`] and failures are logged, never surfaced to the caller.

use std::sync::Arc;

use metrics::counter;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    application::{
        jobs::TaskSupervisor,
        repos::{
            ActivitiesRepo, ActivityRefs, FollowsRepo, NewActivity, NewNotification,
            NotificationsRepo, PreferencesRepo, RepoError,
        },
    },
    domain::{
        entities::{FollowEdge, NotificationRecord},
        types::{ActivityType, NotificationType},
    },
};

const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutConfig {
    /// Rows per multi-row notification insert.
    pub chunk_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub created: usize,
    pub failed: usize,
}

/// Inserts `batch` in chunks. A failing chunk is retried row by row so one
/// bad recipient cannot sink the others.
pub async fn deliver_batch(
    repo: &dyn NotificationsRepo,
    batch: Vec<NewNotification>,
    chunk_size: usize,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for chunk in batch.chunks(chunk_size.max(1)) {
        match repo.insert_notifications(chunk).await {
            Ok(_) => report.created += chunk.len(),
            Err(err) => {
                warn!(
                    target = "shelfwise::application::fanout",
                    rows = chunk.len(),
                    error = %err,
                    "Chunked notification insert failed; retrying per recipient"
                );
                for notification in chunk {
                    let user_id = notification.user_id;
                    match repo.insert_notification(notification.clone()).await {
                        Ok(_) => report.created += 1,
                        Err(err) => {
                            report.failed += 1;
                            error!(
                                target = "shelfwise::application::fanout",
                                user_id = %user_id,
                                notification_type = notification.notification_type.as_str(),
                                error = %err,
                                "Failed to create notification"
                            );
                        }
                    }
                }
            }
        }
    }

    counter!("shelfwise_notifications_created_total").increment(report.created as u64);
    if report.failed > 0 {
        counter!("shelfwise_notifications_failed_total").increment(report.failed as u64);
    }
    report
}

/// Consent check shared by every producer. Missing rows, types without a
/// column and lookup failures all allow delivery.
pub async fn should_notify(
    preferences: &dyn PreferencesRepo,
    user_id: Uuid,
    kind: NotificationType,
) -> bool {
    match preferences.find_preferences(user_id).await {
        Ok(Some(record)) => record.allows(kind).unwrap_or(true),
        Ok(None) => true,
        Err(err) => {
            warn!(
                target = "shelfwise::application::fanout",
                user_id = %user_id,
                notification_type = kind.as_str(),
                error = %err,
                "Preference lookup failed; allowing notification"
            );
            true
        }
    }
}

/// Content of a notification before recipients are known.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub metadata: Value,
}

impl NotificationDraft {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            metadata,
        }
    }

    pub fn for_user(&self, user_id: Uuid) -> NewNotification {
        NewNotification {
            user_id,
            notification_type: self.kind,
            title: self.title.clone(),
            body: self.body.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

struct Stores {
    activities: Arc<dyn ActivitiesRepo>,
    notifications: Arc<dyn NotificationsRepo>,
    preferences: Arc<dyn PreferencesRepo>,
    follows: Arc<dyn FollowsRepo>,
}

#[derive(Clone)]
pub struct FanoutService {
    stores: Arc<Stores>,
    supervisor: TaskSupervisor,
    config: FanoutConfig,
}

impl FanoutService {
    pub fn new(
        activities: Arc<dyn ActivitiesRepo>,
        notifications: Arc<dyn NotificationsRepo>,
        preferences: Arc<dyn PreferencesRepo>,
        follows: Arc<dyn FollowsRepo>,
        supervisor: TaskSupervisor,
        config: FanoutConfig,
    ) -> Self {
        Self {
            stores: Arc::new(Stores {
                activities,
                notifications,
                preferences,
                follows,
            }),
            supervisor,
            config,
        }
    }

    /// Records an activity in the background. `created_at` is taken now, not
    /// when the insert eventually runs.
    pub fn record_activity(
        &self,
        user_id: Uuid,
        activity_type: ActivityType,
        refs: ActivityRefs,
        metadata: Option<Value>,
    ) {
        let activity = NewActivity {
            user_id,
            activity_type,
            refs,
            metadata,
            created_at: OffsetDateTime::now_utc(),
        };
        let stores = self.stores.clone();

        self.supervisor.spawn("record_activity", async move {
            if let Err(err) = stores.activities.insert_activity(activity).await {
                counter!("shelfwise_activity_failed_total").increment(1);
                error!(
                    target = "shelfwise::application::fanout",
                    user_id = %user_id,
                    activity_type = activity_type.as_str(),
                    error = %err,
                    "Failed to record activity"
                );
            }
        });
    }

    /// Notifies every follower of `book_id` except `actor` whose preferences
    /// allow `draft.kind`.
    pub fn notify_book_followers(&self, book_id: Uuid, actor: Uuid, draft: NotificationDraft) {
        let stores = self.stores.clone();
        let chunk_size = self.config.chunk_size;

        self.supervisor.spawn("notify_book_followers", async move {
            let followers = match stores.follows.book_followers(book_id).await {
                Ok(followers) => followers,
                Err(err) => {
                    error!(
                        target = "shelfwise::application::fanout",
                        book_id = %book_id,
                        error = %err,
                        "Failed to load book followers"
                    );
                    return;
                }
            };

            let mut batch = Vec::with_capacity(followers.len());
            let mut suppressed = 0usize;
            for user_id in followers.into_iter().filter(|user_id| *user_id != actor) {
                if should_notify(stores.preferences.as_ref(), user_id, draft.kind).await {
                    batch.push(draft.for_user(user_id));
                } else {
                    suppressed += 1;
                }
            }

            let report = deliver_batch(stores.notifications.as_ref(), batch, chunk_size).await;
            debug!(
                target = "shelfwise::application::fanout",
                book_id = %book_id,
                notification_type = draft.kind.as_str(),
                created = report.created,
                failed = report.failed,
                suppressed,
                "Book follower fan-out finished"
            );
        });
    }

    pub async fn should_notify(&self, user_id: Uuid, kind: NotificationType) -> bool {
        should_notify(self.stores.preferences.as_ref(), user_id, kind).await
    }

    /// Single-recipient notification, awaited by the caller. Returns `None`
    /// when the recipient opted out.
    pub async fn notify_user(
        &self,
        user_id: Uuid,
        draft: &NotificationDraft,
    ) -> Result<Option<NotificationRecord>, RepoError> {
        if !self.should_notify(user_id, draft.kind).await {
            return Ok(None);
        }
        let record = self
            .stores
            .notifications
            .insert_notification(draft.for_user(user_id))
            .await?;
        counter!("shelfwise_notifications_created_total").increment(1);
        Ok(Some(record))
    }

    /// Tells the followee about a new follow edge. Pending edges arrive as
    /// follow requests; the followee's preferences apply.
    pub async fn notify_followee(
        &self,
        edge: &FollowEdge,
        follower_name: &str,
    ) -> Result<Option<NotificationRecord>, RepoError> {
        self.notify_user(edge.followee_id, &compose_follow_notice(edge, follower_name))
            .await
    }
}

pub fn compose_follow_notice(edge: &FollowEdge, follower_name: &str) -> NotificationDraft {
    let kind = edge.notification_type();
    let (title, body) = match kind {
        NotificationType::FollowRequest => (
            "Follow request",
            format!("{follower_name} wants to follow you"),
        ),
        _ => ("New follower", format!("{follower_name} started following you")),
    };
    NotificationDraft::new(
        kind,
        title,
        body,
        json!({
            "follower_id": edge.follower_id,
            "status": edge.status.as_str(),
        }),
    )
}
