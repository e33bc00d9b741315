//! Typed access to the documented upstream endpoints, served through the
//! response cache.

use std::sync::Arc;

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::{
    application::error::CatalogError,
    cache::{CacheSource, ResponseCache},
    domain::{
        books::{CoverSize, cover_url},
        isbn,
        keys::{AuthorKey, WorkKey},
    },
    infra::upstream::types::{
        AuthorWorksResponse, EditionsResponse, IsbnEdition, SearchAuthorsResponse,
        SearchWorksResponse, WorkDocument, first_cover,
    },
};

const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,isbn,cover_i,edition_count";

/// A work document with `description` flattened to plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkDetails {
    pub key: WorkKey,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub author_keys: Vec<AuthorKey>,
    pub subjects: Vec<String>,
}

impl WorkDetails {
    fn from_document(key: WorkKey, document: WorkDocument) -> Self {
        let description = document
            .description
            .map(|text| text.into_string())
            .filter(|text| !text.trim().is_empty());
        let cover_url = first_cover(&document.covers).map(|id| cover_url(id, CoverSize::Medium));
        let author_keys = document
            .authors
            .iter()
            .filter_map(|entry| AuthorKey::parse(&entry.author.key).ok())
            .collect();

        Self {
            key,
            title: document.title,
            description,
            cover_url,
            author_keys,
            subjects: document.subjects,
        }
    }
}

pub struct CatalogService {
    cache: Arc<ResponseCache>,
}

impl CatalogService {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn search_works(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<(SearchWorksResponse, CacheSource), CatalogError> {
        let params = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string())
            .append_pair("fields", SEARCH_FIELDS)
            .finish();
        Ok(self.cache.get_json(&format!("/search.json?{params}")).await?)
    }

    pub async fn search_authors(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<(SearchAuthorsResponse, CacheSource), CatalogError> {
        let params = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string())
            .finish();
        Ok(self
            .cache
            .get_json(&format!("/search/authors.json?{params}"))
            .await?)
    }

    /// Edition lookup. The ISBN is normalised before it becomes part of the
    /// cache key.
    pub async fn isbn(&self, raw: &str) -> Result<(IsbnEdition, CacheSource), CatalogError> {
        let isbn = isbn::normalize(raw)?;
        Ok(self.cache.get_json(&format!("/isbn/{isbn}.json")).await?)
    }

    pub async fn work(&self, key: &WorkKey) -> Result<(WorkDetails, CacheSource), CatalogError> {
        let (document, source) = self.cache.get_json::<WorkDocument>(&key.json_path()).await?;
        Ok((WorkDetails::from_document(key.clone(), document), source))
    }

    pub async fn editions(
        &self,
        key: &WorkKey,
        limit: u32,
    ) -> Result<(EditionsResponse, CacheSource), CatalogError> {
        Ok(self.cache.get_json(&key.editions_path(limit)).await?)
    }

    /// Raw author document; callers pick the fields they need.
    pub async fn author(
        &self,
        key: &AuthorKey,
    ) -> Result<(Map<String, Value>, CacheSource), CatalogError> {
        Ok(self.cache.get_object(&key.json_path()).await?)
    }

    pub async fn author_works(
        &self,
        key: &AuthorKey,
        limit: u32,
    ) -> Result<(AuthorWorksResponse, CacheSource), CatalogError> {
        Ok(self.cache.get_json(&key.works_path(limit)).await?)
    }
}
