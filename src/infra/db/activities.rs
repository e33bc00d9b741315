use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ActivitiesRepo, NewActivity, RepoError},
    domain::{entities::ActivityRecord, types::ActivityType},
};

use super::{PostgresRepositories, map_sqlx_error, util::corrupt_row};

const ACTIVITY_COLUMNS: &str =
    "id, user_id, type, book_id, target_user_id, collection_id, thread_id, metadata, created_at";

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    #[sqlx(rename = "type")]
    activity_type: String,
    book_id: Option<Uuid>,
    target_user_id: Option<Uuid>,
    collection_id: Option<Uuid>,
    thread_id: Option<Uuid>,
    metadata: Option<Value>,
    created_at: OffsetDateTime,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = RepoError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let activity_type = row
            .activity_type
            .parse::<ActivityType>()
            .map_err(|err| corrupt_row("type", err))?;

        Ok(ActivityRecord {
            id: row.id,
            user_id: row.user_id,
            activity_type,
            book_id: row.book_id,
            target_user_id: row.target_user_id,
            collection_id: row.collection_id,
            thread_id: row.thread_id,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ActivitiesRepo for PostgresRepositories {
    async fn insert_activity(&self, activity: NewActivity) -> Result<ActivityRecord, RepoError> {
        let row = query_as::<_, ActivityRow>(&format!(
            "INSERT INTO activities \
                 (id, user_id, type, book_id, target_user_id, collection_id, thread_id, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ACTIVITY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(activity.user_id)
        .bind(activity.activity_type.as_str())
        .bind(activity.refs.book_id)
        .bind(activity.refs.target_user_id)
        .bind(activity.refs.collection_id)
        .bind(activity.refs.thread_id)
        .bind(activity.metadata)
        .bind(activity.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        ActivityRecord::try_from(row)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, RepoError> {
        let rows = query_as::<_, ActivityRow>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ActivityRecord::try_from).collect()
    }
}
