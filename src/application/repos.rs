//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    books::BookFields,
    entities::{
        ActivityRecord, AuthorSnapshotRecord, BookRecord, BookStatsCounts, BookStatsRecord,
        FollowedAuthor, NotificationPreferencesRecord, NotificationRecord,
    },
    keys::{AuthorKey, WorkKey},
    types::{ActivityType, NotificationType},
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Optional references an activity can point at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityRefs {
    pub book_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
}

impl ActivityRefs {
    pub fn book(book_id: Uuid) -> Self {
        Self {
            book_id: Some(book_id),
            ..Self::default()
        }
    }

    pub fn target_user(user_id: Uuid) -> Self {
        Self {
            target_user_id: Some(user_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub activity_type: ActivityType,
    pub refs: ActivityRefs,
    pub metadata: Option<Value>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub metadata: Value,
}

#[async_trait]
pub trait BooksRepo: Send + Sync {
    async fn find_by_work_key(&self, work_key: &WorkKey) -> Result<Option<BookRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookRecord>, RepoError>;

    /// Inserts a book with exactly `fields`, or fills the empty columns of the
    /// existing row. The read and the write happen in one transaction and
    /// nothing is written when no field changes.
    async fn upsert_book(
        &self,
        work_key: &WorkKey,
        fields: &BookFields,
    ) -> Result<BookRecord, RepoError>;
}

#[async_trait]
pub trait BookStatsRepo: Send + Sync {
    /// Aggregates per-user rows for `book_id` inside one read-only snapshot.
    async fn aggregate_counts(&self, book_id: Uuid) -> Result<BookStatsCounts, RepoError>;

    async fn upsert_stats(
        &self,
        book_id: Uuid,
        counts: BookStatsCounts,
    ) -> Result<BookStatsRecord, RepoError>;

    async fn find_stats(&self, book_id: Uuid) -> Result<Option<BookStatsRecord>, RepoError>;
}

#[async_trait]
pub trait ActivitiesRepo: Send + Sync {
    async fn insert_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, RepoError>;
}

#[async_trait]
pub trait NotificationsRepo: Send + Sync {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, RepoError>;

    /// Inserts a batch in one statement; either every row lands or none does.
    async fn insert_notifications(&self, batch: &[NewNotification]) -> Result<u64, RepoError>;

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, RepoError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError>;

    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepoError>;
}

#[async_trait]
pub trait PreferencesRepo: Send + Sync {
    async fn find_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferencesRecord>, RepoError>;

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferencesRecord,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    async fn book_followers(&self, book_id: Uuid) -> Result<Vec<Uuid>, RepoError>;

    async fn author_followers(&self, author_key: &AuthorKey) -> Result<Vec<Uuid>, RepoError>;

    /// One entry per distinct followed author key.
    async fn followed_authors(&self) -> Result<Vec<FollowedAuthor>, RepoError>;
}

#[async_trait]
pub trait AuthorSnapshotsRepo: Send + Sync {
    async fn find_snapshot(
        &self,
        author_key: &AuthorKey,
    ) -> Result<Option<AuthorSnapshotRecord>, RepoError>;

    async fn upsert_snapshot(
        &self,
        author_key: &AuthorKey,
        work_count: i32,
        checked_at: OffsetDateTime,
    ) -> Result<AuthorSnapshotRecord, RepoError>;
}
