//! Page fetchers for crawl workers.
//!
//! [`BrowserlessFetcher`] asks a Browserless instance for the rendered DOM
//! once it is minimally ready (`domcontentloaded`). [`HttpFetcher`] is a plain
//! GET for setups without a headless browser. Either way the crawl worker
//! bounds the whole call with its own timeout.

use crate::utils::truncate_for_log;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Headroom on top of the navigation timeout for the HTTP round trip itself.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("fetch returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Anything that can turn a URL into page HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches the rendered DOM through a Browserless `/content` endpoint.
pub struct BrowserlessFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    navigation_timeout: Duration,
}

impl BrowserlessFetcher {
    /// Build a fetcher for the Browserless instance at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Browserless origin; a trailing slash is dropped
    /// * `token` - Passed as the `token` query parameter when present
    /// * `navigation_timeout` - Page load budget forwarded to the browser
    ///
    /// # Returns
    ///
    /// The fetcher, or [`FetchError::Network`] if the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        navigation_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(navigation_timeout + CLIENT_TIMEOUT_SLACK)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            navigation_timeout,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserlessFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let endpoint = format!("{}/content", self.base_url);
        let mut request = self.client.post(&endpoint).json(&json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": "domcontentloaded",
                "timeout": self.navigation_timeout.as_millis() as u64,
            },
        }));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: truncate_for_log(&message, 300),
            });
        }
        let html = resp.text().await?;
        debug!(bytes = html.len(), "Fetched rendered HTML");
        Ok(html)
    }
}

/// Plain HTTP GET, without script execution.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// A client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("up2d8_ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        let html = resp.text().await?;
        debug!(bytes = html.len(), "Fetched HTML");
        Ok(html)
    }
}
