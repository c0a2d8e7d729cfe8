//! Backend ingestion API client.
//!
//! An alternate write path for the RSS ingestor: articles are posted to the
//! backend instead of written to the store directly. The backend answers
//! `{message, id}`; an "already exists" message (or HTTP 409) is the same
//! expected duplicate outcome the store reports.

use crate::analytics::AnalyticsSink;
use crate::models::{Article, InsertOutcome};
use crate::store::ArticleSink;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
}

/// Body of a create-article reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateArticleResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: Option<String>,
}

impl CreateArticleResponse {
    /// True when the backend says the link is already stored.
    pub fn already_exists(&self) -> bool {
        self.message.to_lowercase().contains("already exists")
    }
}

/// HTTP client for the backend's article and analytics endpoints.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BackendClient {
    /// Build a client rooted at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend origin; a trailing slash is dropped
    /// * `api_key` - Sent as a bearer token when present
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// POST one article to `/api/articles`.
    ///
    /// # Returns
    ///
    /// [`InsertOutcome::AlreadyExists`] for a 409 or an "already exists"
    /// message, [`InsertOutcome::Inserted`] for any other success, and an
    /// error for transport failures and non-success statuses.
    #[instrument(level = "debug", skip_all, fields(link = %article.link))]
    pub async fn create_article(&self, article: &Article) -> Result<InsertOutcome, BackendError> {
        let resp = self.post("/api/articles").json(article).send().await?;
        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: truncate_for_log(&body, 300),
            });
        }
        // A success status with an unreadable body still means the write landed.
        let parsed: CreateArticleResponse = serde_json::from_str(&body).unwrap_or_default();
        debug!(message = %parsed.message, id = ?parsed.id, "Backend accepted article");
        if parsed.already_exists() {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// POST one `{event_name, payload}` event to `/api/analytics`.
    pub async fn log_analytics(&self, event_name: &str, payload: &Value) -> Result<(), BackendError> {
        let resp = self
            .post("/api/analytics")
            .json(&json!({ "event_name": event_name, "payload": payload }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: truncate_for_log(&message, 300),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleSink for BackendClient {
    async fn submit(&self, article: &Article) -> InsertOutcome {
        match self.create_article(article).await {
            Ok(outcome) => outcome,
            Err(e) => InsertOutcome::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl AnalyticsSink for BackendClient {
    async fn record(&self, event_name: &str, payload: Value) {
        if let Err(e) = self.log_analytics(event_name, &payload).await {
            warn!(event = event_name, error = %e, "Failed to log analytics to backend");
        }
    }
}
