use async_trait::async_trait;
use sqlx::{FromRow, Postgres, Transaction, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BooksRepo, RepoError},
    domain::{
        books::{BookFields, NewBook},
        entities::BookRecord,
        keys::WorkKey,
    },
};

use super::{PostgresRepositories, map_sqlx_error, util::corrupt_row};

const BOOK_COLUMNS: &str = "id, work_key, title, cover_url, isbn13, authors, publication_year, \
                            page_count, publisher, subjects, created_at, updated_at";

#[derive(FromRow)]
struct BookRow {
    id: Uuid,
    work_key: String,
    title: String,
    cover_url: String,
    isbn13: String,
    authors: String,
    publication_year: i32,
    page_count: i32,
    publisher: String,
    subjects: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<BookRow> for BookRecord {
    type Error = RepoError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(BookRecord {
            id: row.id,
            work_key: WorkKey::parse(&row.work_key).map_err(|err| corrupt_row("work_key", err))?,
            title: row.title,
            cover_url: row.cover_url,
            isbn13: row.isbn13,
            authors: row.authors,
            publication_year: row.publication_year,
            page_count: row.page_count,
            publisher: row.publisher,
            subjects: row.subjects,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BooksRepo for PostgresRepositories {
    async fn find_by_work_key(&self, work_key: &WorkKey) -> Result<Option<BookRecord>, RepoError> {
        let row = query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE work_key = $1"
        ))
        .bind(work_key.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(BookRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookRecord>, RepoError> {
        let row = query_as::<_, BookRow>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(BookRecord::try_from).transpose()
    }

    async fn upsert_book(
        &self,
        work_key: &WorkKey,
        fields: &BookFields,
    ) -> Result<BookRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let inserted = insert_if_absent(&mut tx, work_key, fields).await?;
        let record = match inserted {
            Some(record) => record,
            None => {
                let row = query_as::<_, BookRow>(&format!(
                    "SELECT {BOOK_COLUMNS} FROM books WHERE work_key = $1 FOR UPDATE"
                ))
                .bind(work_key.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

                let mut record = BookRecord::try_from(row)?;
                if fields.fill_empty(&mut record) {
                    update_columns(&mut tx, &record).await?
                } else {
                    record
                }
            }
        };

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(record)
    }
}

/// `None` when a row for `work_key` already exists.
async fn insert_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    work_key: &WorkKey,
    fields: &BookFields,
) -> Result<Option<BookRecord>, RepoError> {
    let book = NewBook::from_fields(work_key.clone(), fields.clone());
    let row = query_as::<_, BookRow>(&format!(
        "INSERT INTO books (id, work_key, title, cover_url, isbn13, authors, publication_year, \
         page_count, publisher, subjects) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (work_key) DO NOTHING \
         RETURNING {BOOK_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(book.work_key.as_str())
    .bind(&book.title)
    .bind(&book.cover_url)
    .bind(&book.isbn13)
    .bind(&book.authors)
    .bind(book.publication_year)
    .bind(book.page_count)
    .bind(&book.publisher)
    .bind(&book.subjects)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    row.map(BookRecord::try_from).transpose()
}

async fn update_columns(
    tx: &mut Transaction<'_, Postgres>,
    record: &BookRecord,
) -> Result<BookRecord, RepoError> {
    let row = query_as::<_, BookRow>(&format!(
        "UPDATE books SET title = $2, cover_url = $3, isbn13 = $4, authors = $5, \
         publication_year = $6, page_count = $7, publisher = $8, subjects = $9, \
         updated_at = now() \
         WHERE id = $1 \
         RETURNING {BOOK_COLUMNS}"
    ))
    .bind(record.id)
    .bind(&record.title)
    .bind(&record.cover_url)
    .bind(&record.isbn13)
    .bind(&record.authors)
    .bind(record.publication_year)
    .bind(record.page_count)
    .bind(&record.publisher)
    .bind(&record.subjects)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    BookRecord::try_from(row)
}
