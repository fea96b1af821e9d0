//! Value fetchers

use super::value::{parse_scalar, ScalarValue};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single fetch attempt
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Source of the overlay value
#[async_trait]
pub trait ValueFetcher: Send + Sync {
    /// Fetch the current value once
    async fn fetch(&self) -> Result<ScalarValue, FetchError>;

    /// Human-readable description for logs
    fn describe(&self) -> &str;
}

/// Fetches a scalar from an HTTP GET endpoint
pub struct HttpFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFetcher {
    /// Create a fetcher for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("overlay-recorder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, endpoint))
    }

    /// Use an already configured client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ValueFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<ScalarValue, FetchError> {
        let response = self.client.get(&self.endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_scalar(&body)
    }

    fn describe(&self) -> &str {
        &self.endpoint
    }
}
