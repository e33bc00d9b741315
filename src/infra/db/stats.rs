use async_trait::async_trait;
use sqlx::{FromRow, query, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BookStatsRepo, RepoError},
    domain::{
        entities::{BookStatsCounts, BookStatsRecord},
        types::StatusTag,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(FromRow)]
struct BookStatsRow {
    book_id: Uuid,
    reads_count: i64,
    want_to_read_count: i64,
    rating_sum: i64,
    rating_count: i64,
    review_count: i64,
    updated_at: OffsetDateTime,
}

impl From<BookStatsRow> for BookStatsRecord {
    fn from(row: BookStatsRow) -> Self {
        BookStatsRecord {
            book_id: row.book_id,
            counts: BookStatsCounts {
                reads_count: row.reads_count,
                want_to_read_count: row.want_to_read_count,
                rating_sum: row.rating_sum,
                rating_count: row.rating_count,
                review_count: row.review_count,
            },
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RatingCounts {
    rating_count: i64,
    rating_sum: i64,
    review_count: i64,
}

#[derive(FromRow)]
struct ShelfCounts {
    reads_count: i64,
    want_to_read_count: i64,
}

#[async_trait]
impl BookStatsRepo for PostgresRepositories {
    async fn aggregate_counts(&self, book_id: Uuid) -> Result<BookStatsCounts, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Both aggregates must observe the same snapshot.
        query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let ratings = query_as::<_, RatingCounts>(
            "SELECT \
                 COUNT(*) FILTER (WHERE rating > 0) AS rating_count, \
                 COALESCE(SUM(rating) FILTER (WHERE rating > 0), 0)::BIGINT AS rating_sum, \
                 COUNT(*) FILTER (WHERE btrim(review_text) <> '') AS review_count \
             FROM user_books \
             WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let shelves = query_as::<_, ShelfCounts>(
            "SELECT \
                 COUNT(DISTINCT user_id) FILTER (WHERE status_tag = $2) AS reads_count, \
                 COUNT(DISTINCT user_id) FILTER (WHERE status_tag = $3) AS want_to_read_count \
             FROM user_book_status_tags \
             WHERE book_id = $1",
        )
        .bind(book_id)
        .bind(StatusTag::Finished.as_str())
        .bind(StatusTag::WantToRead.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(BookStatsCounts {
            reads_count: shelves.reads_count,
            want_to_read_count: shelves.want_to_read_count,
            rating_sum: ratings.rating_sum,
            rating_count: ratings.rating_count,
            review_count: ratings.review_count,
        })
    }

    async fn upsert_stats(
        &self,
        book_id: Uuid,
        counts: BookStatsCounts,
    ) -> Result<BookStatsRecord, RepoError> {
        let row = query_as::<_, BookStatsRow>(
            "INSERT INTO book_stats \
                 (book_id, reads_count, want_to_read_count, rating_sum, rating_count, review_count, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             ON CONFLICT (book_id) DO UPDATE SET \
                 reads_count = EXCLUDED.reads_count, \
                 want_to_read_count = EXCLUDED.want_to_read_count, \
                 rating_sum = EXCLUDED.rating_sum, \
                 rating_count = EXCLUDED.rating_count, \
                 review_count = EXCLUDED.review_count, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING book_id, reads_count, want_to_read_count, rating_sum, rating_count, \
                       review_count, updated_at",
        )
        .bind(book_id)
        .bind(counts.reads_count)
        .bind(counts.want_to_read_count)
        .bind(counts.rating_sum)
        .bind(counts.rating_count)
        .bind(counts.review_count)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_stats(&self, book_id: Uuid) -> Result<Option<BookStatsRecord>, RepoError> {
        let row = query_as::<_, BookStatsRow>(
            "SELECT book_id, reads_count, want_to_read_count, rating_sum, rating_count, \
                    review_count, updated_at \
             FROM book_stats WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }
}
