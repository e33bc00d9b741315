//! Resolution of imported library rows against the catalog.
//!
//! Rows arrive already parsed as `(title, author, isbn?)`. Each row is
//! matched independently; a failing row is reported and never aborts the
//! batch.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::{
    application::{
        catalog::CatalogService,
        error::CatalogError,
        mirror::MirrorResolver,
    },
    domain::{
        books::{BookFields, CoverSize, cover_url, join_list},
        entities::BookRecord,
        isbn,
        keys::WorkKey,
    },
    infra::upstream::{UpstreamError, types::SearchWorkDoc},
};

const ROW_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Matched { work_key: WorkKey, book: BookRecord },
    NotFound,
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub outcomes: Vec<ImportOutcome>,
    pub matched: usize,
    pub not_found: usize,
    pub failed: usize,
}

pub struct ImportResolver {
    mirror: Arc<MirrorResolver>,
    catalog: Arc<CatalogService>,
}

impl ImportResolver {
    pub fn new(mirror: Arc<MirrorResolver>, catalog: Arc<CatalogService>) -> Self {
        Self { mirror, catalog }
    }

    /// ISBN first when the row has a usable one, then a title/author search.
    pub async fn resolve_row(&self, row: &ImportRow) -> ImportOutcome {
        match self.try_resolve(row).await {
            Ok(Some((work_key, book))) => ImportOutcome::Matched { work_key, book },
            Ok(None) => ImportOutcome::NotFound,
            Err(err) => {
                warn!(
                    target = "shelfwise::application::imports",
                    title = %row.title,
                    author = %row.author,
                    error = %err,
                    kind = err.kind(),
                    "Import row could not be resolved"
                );
                ImportOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Outcomes keep the order of `rows`.
    pub async fn resolve_rows(&self, rows: &[ImportRow]) -> ImportReport {
        let outcomes: Vec<ImportOutcome> = stream::iter(rows)
            .map(|row| self.resolve_row(row))
            .buffered(ROW_CONCURRENCY)
            .collect()
            .await;

        let mut report = ImportReport::default();
        for outcome in &outcomes {
            match outcome {
                ImportOutcome::Matched { .. } => report.matched += 1,
                ImportOutcome::NotFound => report.not_found += 1,
                ImportOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;

        info!(
            target = "shelfwise::application::imports",
            rows = rows.len(),
            matched = report.matched,
            not_found = report.not_found,
            failed = report.failed,
            "Import batch resolved"
        );
        report
    }

    async fn try_resolve(
        &self,
        row: &ImportRow,
    ) -> Result<Option<(WorkKey, BookRecord)>, CatalogError> {
        if let Some(raw) = row.isbn.as_deref().filter(|raw| !raw.trim().is_empty()) {
            match isbn::normalize(raw) {
                Ok(normalized) => match self.mirror.resolve_by_isbn(&normalized).await {
                    Ok(resolution) => {
                        if let (Some(work_key), Some(book)) = (resolution.work_key, resolution.book)
                        {
                            return Ok(Some((work_key, book)));
                        }
                    }
                    Err(CatalogError::Upstream(UpstreamError::Status { status: 404, .. })) => {}
                    Err(err) => return Err(err),
                },
                Err(_) => warn!(
                    target = "shelfwise::application::imports",
                    isbn = raw,
                    "Ignoring malformed ISBN in import row"
                ),
            }
        }

        let query = format!("{} {}", row.title.trim(), row.author.trim());
        if query.trim().is_empty() {
            return Ok(None);
        }

        let (results, _) = self.catalog.search_works(query.trim(), 1).await?;
        let Some(doc) = results.docs.into_iter().next() else {
            return Ok(None);
        };

        let work_key = WorkKey::parse(&doc.key)?;
        let book = self
            .mirror
            .upsert_book(&work_key, &fields_from_search(&doc))
            .await?;
        Ok(Some((work_key, book)))
    }
}

fn fields_from_search(doc: &SearchWorkDoc) -> BookFields {
    let mut fields = BookFields::new().title(doc.title.as_str());
    if !doc.author_name.is_empty() {
        fields = fields.authors(join_list(&doc.author_name));
    }
    if let Some(year) = doc.first_publish_year {
        fields = fields.publication_year(year);
    }
    if let Some(isbn13) = isbn::first_isbn13(&doc.isbn) {
        fields = fields.isbn13(isbn13);
    }
    if let Some(cover_id) = doc.cover_i.filter(|id| *id > 0) {
        fields = fields.cover_url(cover_url(cover_id, CoverSize::Medium));
    }
    fields
}
