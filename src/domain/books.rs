//! Book field merging and upstream presentation helpers.

use serde::Serialize;

use crate::domain::{entities::BookRecord, keys::WorkKey};

const COVERS_BASE: &str = "https://covers.openlibrary.org/b/id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSize {
    Small,
    Medium,
    Large,
}

impl CoverSize {
    fn suffix(self) -> char {
        match self {
            CoverSize::Small => 'S',
            CoverSize::Medium => 'M',
            CoverSize::Large => 'L',
        }
    }
}

pub fn cover_url(cover_id: i64, size: CoverSize) -> String {
    format!("{COVERS_BASE}/{cover_id}-{}.jpg", size.suffix())
}

/// Joins list values the way `authors` and `subjects` are stored.
pub fn join_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Partial set of book fields supplied to an upsert. `None` means "not
/// supplied"; supplied empty strings and zeros never overwrite anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookFields {
    pub title: Option<String>,
    pub cover_url: Option<String>,
    pub isbn13: Option<String>,
    pub authors: Option<String>,
    pub publication_year: Option<i32>,
    pub page_count: Option<i32>,
    pub publisher: Option<String>,
    pub subjects: Option<String>,
}

impl BookFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, value: impl Into<String>) -> Self {
        self.title = Some(value.into());
        self
    }

    pub fn cover_url(mut self, value: impl Into<String>) -> Self {
        self.cover_url = Some(value.into());
        self
    }

    pub fn isbn13(mut self, value: impl Into<String>) -> Self {
        self.isbn13 = Some(value.into());
        self
    }

    pub fn authors(mut self, value: impl Into<String>) -> Self {
        self.authors = Some(value.into());
        self
    }

    pub fn publication_year(mut self, value: i32) -> Self {
        self.publication_year = Some(value);
        self
    }

    pub fn page_count(mut self, value: i32) -> Self {
        self.page_count = Some(value);
        self
    }

    pub fn publisher(mut self, value: impl Into<String>) -> Self {
        self.publisher = Some(value.into());
        self
    }

    pub fn subjects(mut self, value: impl Into<String>) -> Self {
        self.subjects = Some(value.into());
        self
    }

    /// Copies supplied values into empty slots of `record`. Returns whether
    /// any field changed.
    pub fn fill_empty(&self, record: &mut BookRecord) -> bool {
        let mut changed = false;
        changed |= fill_text(&mut record.title, self.title.as_deref());
        changed |= fill_text(&mut record.cover_url, self.cover_url.as_deref());
        changed |= fill_text(&mut record.isbn13, self.isbn13.as_deref());
        changed |= fill_text(&mut record.authors, self.authors.as_deref());
        changed |= fill_number(&mut record.publication_year, self.publication_year);
        changed |= fill_number(&mut record.page_count, self.page_count);
        changed |= fill_text(&mut record.publisher, self.publisher.as_deref());
        changed |= fill_text(&mut record.subjects, self.subjects.as_deref());
        changed
    }
}

fn fill_text(slot: &mut String, value: Option<&str>) -> bool {
    match value {
        Some(value) if slot.trim().is_empty() && !value.trim().is_empty() => {
            *slot = value.trim().to_string();
            true
        }
        _ => false,
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|value| value.trim().to_string()).unwrap_or_default()
}

fn fill_number(slot: &mut i32, value: Option<i32>) -> bool {
    match value {
        Some(value) if *slot == 0 && value != 0 => {
            *slot = value;
            true
        }
        _ => false,
    }
}

/// Row inserted the first time a work key is mirrored: exactly the supplied
/// fields, defaulting to empty strings and zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub work_key: WorkKey,
    pub title: String,
    pub cover_url: String,
    pub isbn13: String,
    pub authors: String,
    pub publication_year: i32,
    pub page_count: i32,
    pub publisher: String,
    pub subjects: String,
}

impl NewBook {
    pub fn from_fields(work_key: WorkKey, fields: BookFields) -> Self {
        Self {
            work_key,
            title: trimmed(fields.title),
            cover_url: trimmed(fields.cover_url),
            isbn13: trimmed(fields.isbn13),
            authors: trimmed(fields.authors),
            publication_year: fields.publication_year.unwrap_or_default(),
            page_count: fields.page_count.unwrap_or_default(),
            publisher: trimmed(fields.publisher),
            subjects: trimmed(fields.subjects),
        }
    }
}
