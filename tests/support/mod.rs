//! In-memory implementations of the repository traits shared by the
//! integration tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use shelfwise::{
    application::{
        catalog::CatalogService,
        repos::{
            ActivitiesRepo, AuthorSnapshotsRepo, BookStatsRepo, BooksRepo, FollowsRepo,
            NewActivity, NewNotification, NotificationsRepo, PreferencesRepo, RepoError,
        },
    },
    cache::{CacheConfig, ResponseCache},
    domain::{
        books::{BookFields, NewBook},
        entities::{
            ActivityRecord, AuthorSnapshotRecord, BookRecord, BookStatsCounts, BookStatsRecord,
            FollowedAuthor, NotificationPreferencesRecord, NotificationRecord,
        },
        keys::{AuthorKey, WorkKey},
        types::{NotificationType, StatusTag},
    },
    infra::upstream::{UpstreamClient, UpstreamConfig, UpstreamSource},
};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserBookRow {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub rating: Option<i16>,
    pub review_text: String,
}

#[derive(Default)]
struct State {
    books: BTreeMap<String, BookRecord>,
    book_writes: usize,
    user_books: Vec<UserBookRow>,
    status_tags: HashSet<(Uuid, Uuid, StatusTag)>,
    stats: HashMap<Uuid, BookStatsRecord>,
    activities: Vec<ActivityRecord>,
    notifications: Vec<NotificationRecord>,
    preferences: HashMap<Uuid, NotificationPreferencesRecord>,
    book_follows: Vec<(Uuid, Uuid)>,
    author_follows: Vec<(Uuid, AuthorKey, String)>,
    snapshots: HashMap<AuthorKey, AuthorSnapshotRecord>,
    missing_users: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_snapshot_writes: AtomicBool,
    fail_preferences: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock")
    }

    pub fn books(&self) -> Vec<BookRecord> {
        self.state().books.values().cloned().collect()
    }

    /// Number of inserts plus updates performed by `upsert_book`.
    pub fn book_writes(&self) -> usize {
        self.state().book_writes
    }

    pub fn add_user_book(&self, row: UserBookRow) {
        self.state().user_books.push(row);
    }

    pub fn add_status_tag(&self, user_id: Uuid, book_id: Uuid, tag: StatusTag) {
        self.state().status_tags.insert((user_id, book_id, tag));
    }

    pub fn stats_for(&self, book_id: Uuid) -> Option<BookStatsRecord> {
        self.state().stats.get(&book_id).cloned()
    }

    pub fn activities(&self) -> Vec<ActivityRecord> {
        self.state().activities.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.state().notifications.clone()
    }

    pub fn notifications_for(&self, user_id: Uuid) -> Vec<NotificationRecord> {
        self.state()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn set_preferences(&self, preferences: NotificationPreferencesRecord) {
        self.state()
            .preferences
            .insert(preferences.user_id, preferences);
    }

    pub fn follow_book(&self, user_id: Uuid, book_id: Uuid) {
        self.state().book_follows.push((user_id, book_id));
    }

    pub fn follow_author(&self, user_id: Uuid, author_key: &AuthorKey, author_name: &str) {
        self.state()
            .author_follows
            .push((user_id, author_key.clone(), author_name.to_string()));
    }

    pub fn snapshot(&self, author_key: &AuthorKey) -> Option<AuthorSnapshotRecord> {
        self.state().snapshots.get(author_key).cloned()
    }

    pub fn seed_snapshot(&self, author_key: &AuthorKey, work_count: i32) {
        self.state().snapshots.insert(
            author_key.clone(),
            AuthorSnapshotRecord {
                author_key: author_key.clone(),
                work_count,
                checked_at: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Notification inserts for `user_id` fail as if the user row were gone.
    pub fn remove_user(&self, user_id: Uuid) {
        self.state().missing_users.insert(user_id);
    }

    pub fn fail_snapshot_writes(&self, fail: bool) {
        self.fail_snapshot_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_preferences(&self, fail: bool) {
        self.fail_preferences.store(fail, Ordering::SeqCst);
    }
}

fn notification_record(notification: NewNotification) -> NotificationRecord {
    NotificationRecord {
        id: Uuid::new_v4(),
        user_id: notification.user_id,
        notification_type: notification.notification_type,
        title: notification.title,
        body: notification.body,
        metadata: notification.metadata,
        read: false,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[async_trait]
impl BooksRepo for MemoryStore {
    async fn find_by_work_key(&self, work_key: &WorkKey) -> Result<Option<BookRecord>, RepoError> {
        Ok(self.state().books.get(work_key.as_str()).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookRecord>, RepoError> {
        Ok(self.state().books.values().find(|b| b.id == id).cloned())
    }

    async fn upsert_book(
        &self,
        work_key: &WorkKey,
        fields: &BookFields,
    ) -> Result<BookRecord, RepoError> {
        let mut state = self.state();
        if let Some(existing) = state.books.get(work_key.as_str()).cloned() {
            let mut record = existing;
            if fields.fill_empty(&mut record) {
                record.updated_at = OffsetDateTime::now_utc();
                state.books.insert(work_key.as_str().to_string(), record.clone());
                state.book_writes += 1;
            }
            return Ok(record);
        }

        let book = NewBook::from_fields(work_key.clone(), fields.clone());
        let now = OffsetDateTime::now_utc();
        let record = BookRecord {
            id: Uuid::new_v4(),
            work_key: book.work_key,
            title: book.title,
            cover_url: book.cover_url,
            isbn13: book.isbn13,
            authors: book.authors,
            publication_year: book.publication_year,
            page_count: book.page_count,
            publisher: book.publisher,
            subjects: book.subjects,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(work_key.as_str().to_string(), record.clone());
        state.book_writes += 1;
        Ok(record)
    }
}

#[async_trait]
impl BookStatsRepo for MemoryStore {
    async fn aggregate_counts(&self, book_id: Uuid) -> Result<BookStatsCounts, RepoError> {
        let state = self.state();
        let rows: Vec<&UserBookRow> = state
            .user_books
            .iter()
            .filter(|row| row.book_id == book_id)
            .collect();

        let rated: Vec<i64> = rows
            .iter()
            .filter_map(|row| row.rating)
            .filter(|rating| *rating > 0)
            .map(i64::from)
            .collect();
        let distinct_users = |tag: StatusTag| {
            state
                .status_tags
                .iter()
                .filter(|(_, book, t)| *book == book_id && *t == tag)
                .map(|(user, _, _)| *user)
                .collect::<HashSet<_>>()
                .len() as i64
        };

        Ok(BookStatsCounts {
            reads_count: distinct_users(StatusTag::Finished),
            want_to_read_count: distinct_users(StatusTag::WantToRead),
            rating_sum: rated.iter().sum(),
            rating_count: rated.len() as i64,
            review_count: rows
                .iter()
                .filter(|row| !row.review_text.trim().is_empty())
                .count() as i64,
        })
    }

    async fn upsert_stats(
        &self,
        book_id: Uuid,
        counts: BookStatsCounts,
    ) -> Result<BookStatsRecord, RepoError> {
        let record = BookStatsRecord {
            book_id,
            counts,
            updated_at: OffsetDateTime::now_utc(),
        };
        self.state().stats.insert(book_id, record.clone());
        Ok(record)
    }

    async fn find_stats(&self, book_id: Uuid) -> Result<Option<BookStatsRecord>, RepoError> {
        Ok(self.stats_for(book_id))
    }
}

#[async_trait]
impl ActivitiesRepo for MemoryStore {
    async fn insert_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError> {
        let record = ActivityRecord {
            id: Uuid::new_v4(),
            user_id: activity.user_id,
            activity_type: activity.activity_type,
            book_id: activity.refs.book_id,
            target_user_id: activity.refs.target_user_id,
            collection_id: activity.refs.collection_id,
            thread_id: activity.refs.thread_id,
            metadata: activity.metadata,
            created_at: activity.created_at,
        };
        self.state().activities.push(record.clone());
        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, RepoError> {
        let mut rows: Vec<ActivityRecord> = self
            .state()
            .activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl NotificationsRepo for MemoryStore {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, RepoError> {
        let mut state = self.state();
        if state.missing_users.contains(&notification.user_id) {
            return Err(RepoError::invalid_input("violates foreign key constraint"));
        }
        let record = notification_record(notification);
        state.notifications.push(record.clone());
        Ok(record)
    }

    async fn insert_notifications(&self, batch: &[NewNotification]) -> Result<u64, RepoError> {
        let mut state = self.state();
        if batch
            .iter()
            .any(|n| state.missing_users.contains(&n.user_id))
        {
            return Err(RepoError::invalid_input("violates foreign key constraint"));
        }
        state
            .notifications
            .extend(batch.iter().cloned().map(notification_record));
        Ok(batch.len() as u64)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state();
        match state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let mut state = self.state();
        let mut updated = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            notification.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .state()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as u64)
    }

    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let mut rows: Vec<NotificationRecord> = self.notifications_for(user_id);
        rows.reverse();
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl PreferencesRepo for MemoryStore {
    async fn find_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferencesRecord>, RepoError> {
        if self.fail_preferences.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self.state().preferences.get(&user_id).cloned())
    }

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferencesRecord,
    ) -> Result<(), RepoError> {
        self.set_preferences(preferences.clone());
        Ok(())
    }
}

#[async_trait]
impl FollowsRepo for MemoryStore {
    async fn book_followers(&self, book_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        Ok(self
            .state()
            .book_follows
            .iter()
            .filter(|(_, book)| *book == book_id)
            .map(|(user, _)| *user)
            .collect())
    }

    async fn author_followers(&self, author_key: &AuthorKey) -> Result<Vec<Uuid>, RepoError> {
        Ok(self
            .state()
            .author_follows
            .iter()
            .filter(|(_, key, _)| key == author_key)
            .map(|(user, _, _)| *user)
            .collect())
    }

    async fn followed_authors(&self) -> Result<Vec<FollowedAuthor>, RepoError> {
        let mut seen = BTreeMap::new();
        for (_, key, name) in &self.state().author_follows {
            seen.entry(key.clone()).or_insert_with(|| name.clone());
        }
        Ok(seen
            .into_iter()
            .map(|(author_key, author_name)| FollowedAuthor {
                author_key,
                author_name,
            })
            .collect())
    }
}

#[async_trait]
impl AuthorSnapshotsRepo for MemoryStore {
    async fn find_snapshot(
        &self,
        author_key: &AuthorKey,
    ) -> Result<Option<AuthorSnapshotRecord>, RepoError> {
        Ok(self.snapshot(author_key))
    }

    async fn upsert_snapshot(
        &self,
        author_key: &AuthorKey,
        work_count: i32,
        checked_at: OffsetDateTime,
    ) -> Result<AuthorSnapshotRecord, RepoError> {
        if self.fail_snapshot_writes.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("snapshot table unavailable"));
        }
        let record = AuthorSnapshotRecord {
            author_key: author_key.clone(),
            work_count,
            checked_at,
        };
        self.state()
            .snapshots
            .insert(author_key.clone(), record.clone());
        Ok(record)
    }
}

/// Enabled for everything except `kind`.
pub fn preferences_without(user_id: Uuid, kind: NotificationType) -> NotificationPreferencesRecord {
    let mut preferences = NotificationPreferencesRecord::all_enabled(user_id);
    match kind {
        NotificationType::NewFollower => preferences.new_follower = false,
        NotificationType::FollowRequest => preferences.follow_request = false,
        NotificationType::FollowAccepted => preferences.follow_accepted = false,
        NotificationType::BookNewThread => preferences.book_new_thread = false,
        NotificationType::BookNewReview => preferences.book_new_review = false,
        NotificationType::ThreadReply => preferences.thread_reply = false,
        NotificationType::NewPublication => preferences.new_publication = false,
        NotificationType::ImportFinished => {}
    }
    preferences
}

/// Catalog over a real HTTP client pointed at `base_url`.
pub fn catalog_for(base_url: &str) -> Arc<CatalogService> {
    let client = UpstreamClient::new(&UpstreamConfig {
        base_url: base_url.to_string(),
        ..UpstreamConfig::default()
    })
    .expect("client builds");
    let source: Arc<dyn UpstreamSource> = Arc::new(client);
    Arc::new(CatalogService::new(Arc::new(ResponseCache::new(
        source,
        &CacheConfig::default(),
    ))))
}
