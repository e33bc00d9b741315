//! Typed views of the upstream documents. Unknown fields are ignored.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KeyRef {
    pub key: String,
}

/// `description` and similar fields arrive either as a bare string or as
/// `{"type": "/type/text", "value": "..."}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    pub fn into_string(self) -> String {
        match self {
            TextValue::Plain(text) | TextValue::Typed { value: text } => text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchWorksResponse {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<SearchWorkDoc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchWorkDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: Vec<String>,
    pub first_publish_year: Option<i32>,
    #[serde(default)]
    pub isbn: Vec<String>,
    pub cover_i: Option<i64>,
    pub edition_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchAuthorsResponse {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<SearchAuthorDoc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchAuthorDoc {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub top_work: Option<String>,
    pub work_count: Option<u32>,
    #[serde(default)]
    pub top_subjects: Vec<String>,
}

/// Edition served by `/isbn/<isbn>.json`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IsbnEdition {
    #[serde(default)]
    pub works: Vec<KeyRef>,
    #[serde(default)]
    pub covers: Vec<i64>,
    pub title: Option<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    pub number_of_pages: Option<i32>,
    #[serde(default)]
    pub isbn_13: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WorkAuthor {
    pub author: KeyRef,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WorkDocument {
    pub title: String,
    pub description: Option<TextValue>,
    #[serde(default)]
    pub covers: Vec<i64>,
    #[serde(default)]
    pub authors: Vec<WorkAuthor>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EditionsResponse {
    pub size: u64,
    #[serde(default)]
    pub entries: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthorWorksResponse {
    pub size: u64,
    #[serde(default)]
    pub entries: Vec<AuthorWorkEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthorWorkEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub covers: Vec<i64>,
}

/// Upstream uses `-1` as a "no cover" placeholder inside cover lists.
pub fn first_cover(covers: &[i64]) -> Option<i64> {
    covers.iter().copied().find(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_accepts_both_shapes() {
        let plain: WorkDocument =
            serde_json::from_str(r#"{"title":"Dune","description":"Spice."}"#).unwrap();
        let typed: WorkDocument = serde_json::from_str(
            r#"{"title":"Dune","description":{"type":"/type/text","value":"Spice."}}"#,
        )
        .unwrap();

        assert_eq!(plain.description.unwrap().into_string(), "Spice.");
        assert_eq!(typed.description.unwrap().into_string(), "Spice.");
    }

    #[test]
    fn work_without_title_fails_to_decode() {
        assert!(serde_json::from_str::<WorkDocument>(r#"{"covers":[1]}"#).is_err());
    }

    #[test]
    fn first_cover_skips_placeholders() {
        assert_eq!(first_cover(&[-1, 42]), Some(42));
        assert_eq!(first_cover(&[]), None);
    }

    #[test]
    fn author_works_ignores_unknown_fields() {
        let parsed: AuthorWorksResponse = serde_json::from_str(
            r#"{"size":4,"links":{"self":"x"},"entries":[{"title":"T3","type":{"key":"/type/work"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.size, 4);
        assert_eq!(parsed.entries[0].title, "T3");
        assert!(parsed.entries[0].covers.is_empty());
    }
}
