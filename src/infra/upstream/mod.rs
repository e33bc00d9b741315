//! HTTP client for the upstream bibliographic catalog.

mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

pub use client::UpstreamClient;

pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Prefix for every request path, without a trailing slash.
    pub base_url: String,
    /// Deadline covering connect, send and body read of a single call.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("shelfwise/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream transport failure for `{url}`: {message}")]
    Transport { url: String, message: String },
    #[error("upstream returned status {status} for `{url}`")]
    Status { url: String, status: u16 },
    #[error("upstream response from `{url}` could not be decoded: {message}")]
    Decode { url: String, message: String },
}

impl UpstreamError {
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Decode { .. } => "decode",
        }
    }
}

/// Anything that can serve raw upstream bodies by request path.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Absolute URL a path resolves to. Also the response-cache key.
    fn url_for(&self, path: &str) -> String;

    /// Body of a `200 OK` response; any other status is an error.
    async fn fetch_raw(&self, path: &str) -> Result<Bytes, UpstreamError>;

    async fn fetch_json(&self, path: &str) -> Result<Map<String, Value>, UpstreamError> {
        let body = self.fetch_raw(path).await?;
        decode_object(&self.url_for(path), &body)
    }
}

/// Decodes a body that must hold a JSON object at the top level.
pub fn decode_object(url: &str, body: &[u8]) -> Result<Map<String, Value>, UpstreamError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(UpstreamError::decode(
            url,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
        Err(err) => Err(UpstreamError::decode(url, err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
