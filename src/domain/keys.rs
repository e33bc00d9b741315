//! Upstream identifiers for works and authors.
//!
//! The upstream hands out keys prefixed with their collection (`/works/OL1W`,
//! `/authors/OL1A`). Keys are stored bare; the prefix is stripped once when a
//! key enters the mirror and upstream paths are built from the bare form.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

const WORK_PREFIX: &str = "/works/";
const AUTHOR_PREFIX: &str = "/authors/";
const MAX_KEY_LEN: usize = 32;

/// Stable identifier of a conceptual work in the upstream catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkKey(String);

impl WorkKey {
    /// Accepts either a bare key (`OL123W`) or the upstream form
    /// (`/works/OL123W`).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let bare = raw.trim();
        let bare = bare.strip_prefix(WORK_PREFIX).unwrap_or(bare);
        validate_key(bare, "work key")?;
        Ok(Self(bare.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn json_path(&self) -> String {
        format!("{WORK_PREFIX}{}.json", self.0)
    }

    pub fn editions_path(&self, limit: u32) -> String {
        format!("{WORK_PREFIX}{}/editions.json?limit={limit}", self.0)
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an author in the upstream catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorKey(String);

impl AuthorKey {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let bare = raw.trim();
        let bare = bare.strip_prefix(AUTHOR_PREFIX).unwrap_or(bare);
        validate_key(bare, "author key")?;
        Ok(Self(bare.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn json_path(&self) -> String {
        format!("{AUTHOR_PREFIX}{}.json", self.0)
    }

    pub fn works_path(&self, limit: u32) -> String {
        format!("{AUTHOR_PREFIX}{}/works.json?limit={limit}", self.0)
    }
}

impl fmt::Display for AuthorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_key(bare: &str, kind: &'static str) -> Result<(), DomainError> {
    if bare.is_empty() {
        return Err(DomainError::invalid_key(kind, "must not be empty"));
    }
    if bare.len() > MAX_KEY_LEN {
        return Err(DomainError::invalid_key(
            kind,
            format!("`{bare}` exceeds {MAX_KEY_LEN} characters"),
        ));
    }
    if !bare.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DomainError::invalid_key(
            kind,
            format!("`{bare}` must be ASCII alphanumeric"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_key_strips_upstream_prefix_once() {
        let key = WorkKey::parse("/works/OL45804W").expect("valid key");
        assert_eq!(key.as_str(), "OL45804W");
        assert_eq!(key.json_path(), "/works/OL45804W.json");
    }

    #[test]
    fn work_key_accepts_bare_form() {
        let key = WorkKey::parse("OL1W").expect("valid key");
        assert_eq!(key.to_string(), "OL1W");
    }

    #[test]
    fn doubly_prefixed_key_is_rejected() {
        assert!(WorkKey::parse("/works//works/OL1W").is_err());
    }

    #[test]
    fn empty_and_slashed_keys_are_rejected() {
        assert!(WorkKey::parse("").is_err());
        assert!(WorkKey::parse("/works/").is_err());
        assert!(WorkKey::parse("OL1W/editions").is_err());
    }

    #[test]
    fn author_paths_use_bare_key() {
        let key = AuthorKey::parse("/authors/OL23919A").expect("valid key");
        assert_eq!(key.works_path(5), "/authors/OL23919A/works.json?limit=5");
    }
}
