//! JSON export of unprocessed articles for the newsletter consumer.
//!
//! # Output
//!
//! ```json
//! { "generated_at": "2025-05-06T20:30:00+00:00", "count": 2, "articles": [ ... ] }
//! ```
//!
//! Written to a file (parent directory created on demand) or to stdout.

use crate::models::Article;
use crate::store::{ArticleStore, StoreError};
use crate::utils::ensure_writable_dir;
use chrono::Utc;
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// The export document: every pending article plus a timestamp.
#[derive(Debug, Serialize)]
pub struct ArticleBatch {
    pub generated_at: String,
    pub count: usize,
    pub articles: Vec<Article>,
}

impl ArticleBatch {
    pub fn new(articles: Vec<Article>) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            count: articles.len(),
            articles,
        }
    }

    /// Links of every article in the batch, for marking them processed.
    pub fn links(&self) -> Vec<String> {
        self.articles.iter().map(|a| a.link.clone()).collect()
    }
}

/// Load every unprocessed article into a batch.
pub async fn pending_batch(store: &dyn ArticleStore) -> Result<ArticleBatch, StoreError> {
    let articles = store.find_unprocessed().await?;
    info!(count = articles.len(), "Loaded unprocessed articles");
    Ok(ArticleBatch::new(articles))
}

/// Write `batch` as pretty JSON to `output`, or stdout when `None`.
#[instrument(level = "info", skip_all, fields(count = batch.count))]
pub async fn write_batch(
    batch: &ArticleBatch,
    output: Option<&Path>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(batch)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                ensure_writable_dir(parent).await?;
            }
            fs::write(path, json).await?;
            info!(path = %path.display(), "Wrote article export");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
