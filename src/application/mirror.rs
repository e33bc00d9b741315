//! Local mirror of upstream works.
//!
//! Every entry point that receives an upstream key strips its `/works/`
//! prefix exactly once through [`WorkKey::parse`]; stored keys are bare and
//! are never prefixed again on write.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    application::{catalog::CatalogService, error::CatalogError, repos::BooksRepo},
    domain::{
        books::{BookFields, CoverSize, cover_url, join_list},
        entities::BookRecord,
        isbn,
        keys::WorkKey,
    },
    infra::upstream::types::{IsbnEdition, first_cover},
};

const MAX_SUBJECTS: usize = 10;

/// Result of an ISBN lookup. Both halves are `None` when the edition does not
/// reference any work.
#[derive(Debug, Clone, PartialEq)]
pub struct IsbnResolution {
    pub work_key: Option<WorkKey>,
    pub book: Option<BookRecord>,
}

impl IsbnResolution {
    fn unresolved() -> Self {
        Self {
            work_key: None,
            book: None,
        }
    }
}

pub struct MirrorResolver {
    books: Arc<dyn BooksRepo>,
    catalog: Arc<CatalogService>,
}

impl MirrorResolver {
    pub fn new(books: Arc<dyn BooksRepo>, catalog: Arc<CatalogService>) -> Self {
        Self { books, catalog }
    }

    pub async fn find(&self, work_key: &WorkKey) -> Result<Option<BookRecord>, CatalogError> {
        Ok(self.books.find_by_work_key(work_key).await?)
    }

    /// Creates the book on first sight, afterwards only fills empty fields.
    pub async fn upsert_book(
        &self,
        work_key: &WorkKey,
        fields: &BookFields,
    ) -> Result<BookRecord, CatalogError> {
        let book = self.books.upsert_book(work_key, fields).await?;
        debug!(
            target = "shelfwise::application::mirror",
            work_key = %work_key,
            book_id = %book.id,
            "Mirrored book"
        );
        Ok(book)
    }

    pub async fn resolve_by_isbn(&self, raw_isbn: &str) -> Result<IsbnResolution, CatalogError> {
        let normalized = isbn::normalize(raw_isbn)?;
        let (edition, source) = self.catalog.isbn(&normalized).await?;

        let Some(first) = edition.works.first() else {
            info!(
                target = "shelfwise::application::mirror",
                isbn = %normalized,
                "Edition does not reference a work"
            );
            return Ok(IsbnResolution::unresolved());
        };

        let work_key = WorkKey::parse(&first.key)?;
        let fields = fields_from_edition(&normalized, &edition);
        let book = self.upsert_book(&work_key, &fields).await?;

        debug!(
            target = "shelfwise::application::mirror",
            isbn = %normalized,
            work_key = %work_key,
            cache = source.as_str(),
            "Resolved ISBN"
        );

        Ok(IsbnResolution {
            work_key: Some(work_key),
            book: Some(book),
        })
    }

    /// Like [`Self::resolve_by_isbn`], but when the upstream cannot be reached
    /// the caller's locally known fields are mirrored instead. Without a
    /// fallback the upstream error propagates.
    pub async fn resolve_by_isbn_or_fallback(
        &self,
        raw_isbn: &str,
        fallback: Option<(WorkKey, BookFields)>,
    ) -> Result<IsbnResolution, CatalogError> {
        match self.resolve_by_isbn(raw_isbn).await {
            Err(CatalogError::Upstream(err)) => {
                let Some((work_key, fields)) = fallback else {
                    return Err(CatalogError::Upstream(err));
                };
                warn!(
                    target = "shelfwise::application::mirror",
                    isbn = raw_isbn,
                    work_key = %work_key,
                    error = %err,
                    "Upstream ISBN lookup failed; mirroring local fallback"
                );
                let book = self.upsert_book(&work_key, &fields).await?;
                Ok(IsbnResolution {
                    work_key: Some(work_key),
                    book: Some(book),
                })
            }
            other => other,
        }
    }

    /// Fetches the work document and author names, then fill-empty upserts.
    /// Author lookups are best-effort: a failing author is left out.
    pub async fn resolve_work(&self, work_key: &WorkKey) -> Result<BookRecord, CatalogError> {
        let (details, _) = self.catalog.work(work_key).await?;

        let mut names = Vec::with_capacity(details.author_keys.len());
        for author_key in &details.author_keys {
            match self.catalog.author(author_key).await {
                Ok((document, _)) => {
                    if let Some(name) = document.get("name").and_then(|value| value.as_str()) {
                        names.push(name.to_string());
                    }
                }
                Err(err) => warn!(
                    target = "shelfwise::application::mirror",
                    work_key = %work_key,
                    author_key = %author_key,
                    error = %err,
                    "Skipping author name"
                ),
            }
        }

        let mut fields = BookFields::new().title(details.title);
        if let Some(url) = details.cover_url {
            fields = fields.cover_url(url);
        }
        if !names.is_empty() {
            fields = fields.authors(join_list(&names));
        }
        if !details.subjects.is_empty() {
            fields = fields.subjects(join_list(details.subjects.iter().take(MAX_SUBJECTS)));
        }

        self.upsert_book(work_key, &fields).await
    }
}

fn fields_from_edition(normalized_isbn: &str, edition: &IsbnEdition) -> BookFields {
    let mut fields = BookFields::new();
    if let Some(title) = edition.title.as_deref() {
        fields = fields.title(title);
    }
    if let Some(id) = first_cover(&edition.covers) {
        fields = fields.cover_url(cover_url(id, CoverSize::Medium));
    }
    let isbn13 = if normalized_isbn.len() == 13 {
        Some(normalized_isbn.to_string())
    } else {
        isbn::first_isbn13(&edition.isbn_13)
    };
    if let Some(isbn13) = isbn13 {
        fields = fields.isbn13(isbn13);
    }
    if let Some(publisher) = edition.publishers.first() {
        fields = fields.publisher(publisher.as_str());
    }
    if let Some(pages) = edition.number_of_pages {
        fields = fields.page_count(pages);
    }
    fields
}
