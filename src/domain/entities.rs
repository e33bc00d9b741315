//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    keys::{AuthorKey, WorkKey},
    types::{ActivityType, FollowStatus, NotificationType},
};

/// A mirrored upstream work. Fields are filled, never overwritten once set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRecord {
    pub id: Uuid,
    pub work_key: WorkKey,
    pub title: String,
    pub cover_url: String,
    pub isbn13: String,
    pub authors: String,
    pub publication_year: i32,
    pub page_count: i32,
    pub publisher: String,
    pub subjects: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Aggregate counts derived from per-user book rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookStatsCounts {
    pub reads_count: i64,
    pub want_to_read_count: i64,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub review_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStatsRecord {
    pub book_id: Uuid,
    pub counts: BookStatsCounts,
    pub updated_at: OffsetDateTime,
}

impl BookStatsRecord {
    /// Mean of the positive ratings, absent when nobody rated the book.
    pub fn average_rating(&self) -> Option<f64> {
        (self.counts.rating_count > 0)
            .then(|| self.counts.rating_sum as f64 / self.counts.rating_count as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_type: ActivityType,
    pub book_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
    pub metadata: Option<Value>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub metadata: Value,
    pub read: bool,
    pub created_at: OffsetDateTime,
}

/// One boolean per preference column. A missing row means every type is
/// enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPreferencesRecord {
    pub user_id: Uuid,
    pub new_follower: bool,
    pub follow_request: bool,
    pub follow_accepted: bool,
    pub book_new_thread: bool,
    pub book_new_review: bool,
    pub thread_reply: bool,
    pub new_publication: bool,
}

impl NotificationPreferencesRecord {
    pub fn all_enabled(user_id: Uuid) -> Self {
        Self {
            user_id,
            new_follower: true,
            follow_request: true,
            follow_accepted: true,
            book_new_thread: true,
            book_new_review: true,
            thread_reply: true,
            new_publication: true,
        }
    }

    /// Value of the column named after `kind`, or `None` when the type has no
    /// column.
    pub fn allows(&self, kind: NotificationType) -> Option<bool> {
        match kind {
            NotificationType::NewFollower => Some(self.new_follower),
            NotificationType::FollowRequest => Some(self.follow_request),
            NotificationType::FollowAccepted => Some(self.follow_accepted),
            NotificationType::BookNewThread => Some(self.book_new_thread),
            NotificationType::BookNewReview => Some(self.book_new_review),
            NotificationType::ThreadReply => Some(self.thread_reply),
            NotificationType::NewPublication => Some(self.new_publication),
            NotificationType::ImportFinished => None,
        }
    }
}

/// User-to-user follow. The follow graph is owned by the social handlers;
/// this layer only derives which notice the followee receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub status: FollowStatus,
}

impl FollowEdge {
    pub fn notification_type(&self) -> NotificationType {
        match self.status {
            FollowStatus::Active => NotificationType::NewFollower,
            FollowStatus::Pending => NotificationType::FollowRequest,
        }
    }
}

/// Followed author as seen by the poller: one row per distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowedAuthor {
    pub author_key: AuthorKey,
    pub author_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSnapshotRecord {
    pub author_key: AuthorKey,
    pub work_count: i32,
    pub checked_at: OffsetDateTime,
}
