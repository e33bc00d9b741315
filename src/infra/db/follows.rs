use async_trait::async_trait;
use sqlx::{FromRow, query_as, query_scalar};
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::repos::{FollowsRepo, RepoError},
    domain::{entities::FollowedAuthor, keys::AuthorKey},
};

use super::{PostgresRepositories, map_sqlx_error, util::corrupt_row};

#[derive(FromRow)]
struct FollowedAuthorRow {
    author_key: String,
    author_name: String,
}

impl TryFrom<FollowedAuthorRow> for FollowedAuthor {
    type Error = RepoError;

    fn try_from(row: FollowedAuthorRow) -> Result<Self, Self::Error> {
        Ok(FollowedAuthor {
            author_key: AuthorKey::parse(&row.author_key)
                .map_err(|err| corrupt_row("author_key", err))?,
            author_name: row.author_name,
        })
    }
}

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn book_followers(&self, book_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        query_scalar("SELECT user_id FROM book_follows WHERE book_id = $1 ORDER BY user_id")
            .bind(book_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn author_followers(&self, author_key: &AuthorKey) -> Result<Vec<Uuid>, RepoError> {
        query_scalar("SELECT user_id FROM author_follows WHERE author_key = $1 ORDER BY user_id")
            .bind(author_key.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn followed_authors(&self) -> Result<Vec<FollowedAuthor>, RepoError> {
        // Followers may have stored different display names; the earliest
        // follow wins.
        let rows = query_as::<_, FollowedAuthorRow>(
            "SELECT DISTINCT ON (author_key) author_key, author_name \
             FROM author_follows \
             ORDER BY author_key, created_at, user_id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let authors = rows
            .into_iter()
            .filter_map(|row| {
                let raw_key = row.author_key.clone();
                match FollowedAuthor::try_from(row) {
                    Ok(author) => Some(author),
                    Err(err) => {
                        warn!(
                            target = "shelfwise::infra::db::follows",
                            author_key = %raw_key,
                            error = %err,
                            "Skipping author follow with malformed key"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(authors)
    }
}
