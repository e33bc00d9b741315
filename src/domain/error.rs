use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("`{raw}` is not an ISBN")]
    InvalidIsbn { raw: String },
    #[error("invalid {kind}: {reason}")]
    InvalidKey { kind: &'static str, reason: String },
    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },
}

impl DomainError {
    pub fn invalid_isbn(raw: impl Into<String>) -> Self {
        Self::InvalidIsbn { raw: raw.into() }
    }

    pub fn invalid_key(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            kind,
            reason: reason.into(),
        }
    }

    pub fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
