use async_trait::async_trait;
use sqlx::{FromRow, query_as};
use time::OffsetDateTime;

use crate::{
    application::repos::{AuthorSnapshotsRepo, RepoError},
    domain::{entities::AuthorSnapshotRecord, keys::AuthorKey},
};

use super::{PostgresRepositories, map_sqlx_error, util::corrupt_row};

#[derive(FromRow)]
struct SnapshotRow {
    author_key: String,
    work_count: i32,
    checked_at: OffsetDateTime,
}

impl TryFrom<SnapshotRow> for AuthorSnapshotRecord {
    type Error = RepoError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(AuthorSnapshotRecord {
            author_key: AuthorKey::parse(&row.author_key)
                .map_err(|err| corrupt_row("author_key", err))?,
            work_count: row.work_count,
            checked_at: row.checked_at,
        })
    }
}

#[async_trait]
impl AuthorSnapshotsRepo for PostgresRepositories {
    async fn find_snapshot(
        &self,
        author_key: &AuthorKey,
    ) -> Result<Option<AuthorSnapshotRecord>, RepoError> {
        let row = query_as::<_, SnapshotRow>(
            "SELECT author_key, work_count, checked_at \
             FROM author_works_snapshot WHERE author_key = $1",
        )
        .bind(author_key.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(AuthorSnapshotRecord::try_from).transpose()
    }

    async fn upsert_snapshot(
        &self,
        author_key: &AuthorKey,
        work_count: i32,
        checked_at: OffsetDateTime,
    ) -> Result<AuthorSnapshotRecord, RepoError> {
        let row = query_as::<_, SnapshotRow>(
            "INSERT INTO author_works_snapshot (author_key, work_count, checked_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (author_key) DO UPDATE SET \
                 work_count = EXCLUDED.work_count, \
                 checked_at = EXCLUDED.checked_at \
             RETURNING author_key, work_count, checked_at",
        )
        .bind(author_key.as_str())
        .bind(work_count)
        .bind(checked_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        AuthorSnapshotRecord::try_from(row)
    }
}
