use thiserror::Error;

use crate::{
    application::repos::RepoError,
    config::LoadError,
    domain::error::DomainError,
    infra::{error::InfraError, upstream::UpstreamError},
};

/// Failure of a request-path catalog operation. Handlers map these to their
/// own responses.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("record store error: {0}")]
    Store(#[from] RepoError),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("{entity} `{key}` yielded no usable catalog data")]
    NotFound { entity: &'static str, key: String },
}

impl CatalogError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::Upstream(UpstreamError::Transport { .. }) => "upstream_transport",
            CatalogError::Upstream(UpstreamError::Status { .. }) => "upstream_status",
            CatalogError::Upstream(UpstreamError::Decode { .. }) => "upstream_decode",
            CatalogError::Store(_) => "store",
            CatalogError::Invalid(_) => "invalid",
            CatalogError::NotFound { .. } => "not_found",
        }
    }
}

/// Process-level failure reported by the binary before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
