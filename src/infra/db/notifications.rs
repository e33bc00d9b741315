use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, Postgres, QueryBuilder, query, query_as, query_scalar};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewNotification, NotificationsRepo, RepoError},
    domain::{entities::NotificationRecord, types::NotificationType},
};

use super::{PostgresRepositories, map_sqlx_error, util::corrupt_row};

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, title, body, metadata, read, created_at";

#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    body: String,
    metadata: Value,
    read: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = RepoError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let notification_type = row
            .notification_type
            .parse::<NotificationType>()
            .map_err(|err| corrupt_row("type", err))?;

        Ok(NotificationRecord {
            id: row.id,
            user_id: row.user_id,
            notification_type,
            title: row.title,
            body: row.body,
            metadata: row.metadata,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl NotificationsRepo for PostgresRepositories {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<NotificationRecord, RepoError> {
        let row = query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (id, user_id, type, title, body, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.notification_type.as_str())
        .bind(notification.title)
        .bind(notification.body)
        .bind(notification.metadata)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        NotificationRecord::try_from(row)
    }

    async fn insert_notifications(&self, batch: &[NewNotification]) -> Result<u64, RepoError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO notifications (id, user_id, type, title, body, metadata) ",
        );
        builder.push_values(batch, |mut row, notification| {
            row.push_bind(Uuid::new_v4())
                .push_bind(notification.user_id)
                .push_bind(notification.notification_type.as_str())
                .push_bind(notification.title.clone())
                .push_bind(notification.body.clone())
                .push_bind(notification.metadata.clone());
        });

        let result = builder
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, RepoError> {
        let result = query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let result = query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 =
            query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read")
                .bind(user_id)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_recent(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let rows = query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(NotificationRecord::try_from).collect()
    }
}
