//! HTTP client for the GHO OData API
//!
//! `GET <base>/<indicator>?$top=<limit>&$skip=<offset>` returns
//! `{"value": [...]}`. A single attempt per page; anything but a 2xx with a
//! JSON envelope is a [`FetchError`]. The elements of `value` are passed on
//! undecoded so that one malformed record cannot fail its whole page.

use crate::config::SourceConfig;
use crate::error::{FetchError, IngestError};
use crate::source::PageFetcher;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// OData response envelope
#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    value: Vec<Value>,
}

/// Page fetcher backed by the GHO API
pub struct GhoClient {
    client: Client,
    indicator_url: String,
}

impl GhoClient {
    /// Build a client with the configured request timeout
    pub fn new(config: &SourceConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("gho-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            indicator_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.indicator
            ),
        })
    }

    /// URL of the indicator collection (without paging parameters)
    pub fn indicator_url(&self) -> &str {
        &self.indicator_url
    }
}

#[async_trait]
impl PageFetcher for GhoClient {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Value>, FetchError> {
        debug!(url = %self.indicator_url, offset, limit, "Requesting page");

        let response = self
            .client
            .get(&self.indicator_url)
            .query(&[("$top", limit), ("$skip", offset)])
            .send()
            .await
            .map_err(|source| FetchError::Transport { offset, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { offset, status });
        }

        let envelope: PageEnvelope = response
            .json()
            .await
            .map_err(|source| FetchError::Decode { offset, source })?;

        Ok(envelope.value)
    }
}
