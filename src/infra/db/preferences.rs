use async_trait::async_trait;
use sqlx::{FromRow, query, query_as};
use uuid::Uuid;

use crate::{
    application::repos::{PreferencesRepo, RepoError},
    domain::entities::NotificationPreferencesRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct PreferencesRow {
    user_id: Uuid,
    new_follower: bool,
    follow_request: bool,
    follow_accepted: bool,
    book_new_thread: bool,
    book_new_review: bool,
    thread_reply: bool,
    new_publication: bool,
}

impl From<PreferencesRow> for NotificationPreferencesRecord {
    fn from(row: PreferencesRow) -> Self {
        NotificationPreferencesRecord {
            user_id: row.user_id,
            new_follower: row.new_follower,
            follow_request: row.follow_request,
            follow_accepted: row.follow_accepted,
            book_new_thread: row.book_new_thread,
            book_new_review: row.book_new_review,
            thread_reply: row.thread_reply,
            new_publication: row.new_publication,
        }
    }
}

#[async_trait]
impl PreferencesRepo for PostgresRepositories {
    async fn find_preferences(
        &self,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferencesRecord>, RepoError> {
        let row = query_as::<_, PreferencesRow>(
            "SELECT user_id, new_follower, follow_request, follow_accepted, book_new_thread, \
                    book_new_review, thread_reply, new_publication \
             FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn upsert_preferences(
        &self,
        preferences: &NotificationPreferencesRecord,
    ) -> Result<(), RepoError> {
        query(
            "INSERT INTO notification_preferences \
                 (user_id, new_follower, follow_request, follow_accepted, book_new_thread, \
                  book_new_review, thread_reply, new_publication) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 new_follower = EXCLUDED.new_follower, \
                 follow_request = EXCLUDED.follow_request, \
                 follow_accepted = EXCLUDED.follow_accepted, \
                 book_new_thread = EXCLUDED.book_new_thread, \
                 book_new_review = EXCLUDED.book_new_review, \
                 thread_reply = EXCLUDED.thread_reply, \
                 new_publication = EXCLUDED.new_publication",
        )
        .bind(preferences.user_id)
        .bind(preferences.new_follower)
        .bind(preferences.follow_request)
        .bind(preferences.follow_accepted)
        .bind(preferences.book_new_thread)
        .bind(preferences.book_new_review)
        .bind(preferences.thread_reply)
        .bind(preferences.new_publication)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
