use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::{UpstreamConfig, UpstreamError, UpstreamSource};

const TARGET: &str = "shelfwise::infra::upstream";

/// Plain GET client: one attempt per call, no retries.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|err| UpstreamError::Transport {
                url: config.base_url.clone(),
                message: format!("failed to build HTTP client: {err}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl UpstreamSource for UpstreamClient {
    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_raw(&self, path: &str) -> Result<Bytes, UpstreamError> {
        let url = self.url_for(path);
        debug!(target = TARGET, url = %url, "Fetching upstream resource");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| transport_error(&url, &err))?;

        let status = response.status();
        if status != StatusCode::OK {
            counter!("shelfwise_upstream_request_total", "outcome" => "status").increment(1);
            warn!(
                target = TARGET,
                url = %url,
                status = status.as_u16(),
                "Upstream returned non-200 status"
            );
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&url, &err))?;
        counter!("shelfwise_upstream_request_total", "outcome" => "ok").increment(1);
        Ok(body)
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> UpstreamError {
    counter!("shelfwise_upstream_request_total", "outcome" => "transport").increment(1);
    let message = if err.is_timeout() {
        format!("deadline exceeded: {err}")
    } else {
        err.to_string()
    };
    warn!(target = TARGET, url = %url, error = %message, "Upstream transport failure");
    UpstreamError::Transport {
        url: url.to_string(),
        message,
    }
}
