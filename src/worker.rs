//! Crawl workers: one queued URL in, at most one article out.
//!
//! A worker never retries and never re-queues. Fetch failures and timeouts
//! abandon the task quietly; a duplicate `link` is a normal outcome; only a
//! store failure surfaces as an error.

use crate::config::CrawlerSettings;
use crate::extract::{build_summary, extract_page};
use crate::fetch::{FetchError, PageFetcher};
use crate::models::{Article, CrawlTask, InsertOutcome};
use crate::store::ArticleStore;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to store article {link}: {reason}")]
    Store { link: String, reason: String },
}

/// How a consumed task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Stored,
    /// Another delivery of the same URL got there first.
    Duplicate,
    /// Nothing was stored; the task still counts as consumed.
    Abandoned(String),
}

/// Fetches, extracts, and stores one page per task.
pub struct CrawlWorker {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ArticleStore>,
    fetch_timeout: Duration,
    summary_lines: usize,
}

impl CrawlWorker {
    /// # Arguments
    ///
    /// * `fetcher` - Source of page HTML
    /// * `store` - Destination for extracted articles
    /// * `settings` - Fetch timeout and summary length
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ArticleStore>,
        settings: &CrawlerSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            fetch_timeout: settings.fetch_timeout(),
            summary_lines: settings.summary_lines,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_html(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        }
    }

    /// Process a single task.
    #[instrument(level = "info", skip_all, fields(url = %task.url))]
    pub async fn process(&self, task: &CrawlTask) -> Result<CrawlOutcome, CrawlError> {
        let url = task.url.as_str();
        info!("Crawling");

        let html = match self.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Failed to get page content; abandoning task");
                return Ok(CrawlOutcome::Abandoned(e.to_string()));
            }
        };
        if html.trim().is_empty() {
            warn!("No HTML content found");
            return Ok(CrawlOutcome::Abandoned("empty page".to_string()));
        }

        let page = extract_page(&html);
        info!(
            title = %page.title,
            strategy = page.strategy.unwrap_or("full_text"),
            bytes = page.body.len(),
            "Extracted page"
        );
        let summary = build_summary(&page.body, self.summary_lines);
        let article = Article::crawled(url, page.title, summary, page.body);

        match self.store.insert(&article).await {
            InsertOutcome::Inserted => {
                info!("Inserted new article");
                Ok(CrawlOutcome::Stored)
            }
            InsertOutcome::AlreadyExists => {
                info!("Article already exists; skipping");
                Ok(CrawlOutcome::Duplicate)
            }
            InsertOutcome::Failed(reason) => Err(CrawlError::Store {
                link: article.link,
                reason,
            }),
        }
    }
}

/// Counters for a drained task stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    pub stored: usize,
    pub duplicates: usize,
    pub abandoned: usize,
    pub failed: usize,
}

impl PoolReport {
    fn record(&mut self, result: &Result<CrawlOutcome, CrawlError>) {
        match result {
            Ok(CrawlOutcome::Stored) => self.stored += 1,
            Ok(CrawlOutcome::Duplicate) => self.duplicates += 1,
            Ok(CrawlOutcome::Abandoned(_)) => self.abandoned += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Drain `tasks` with at most `concurrency` workers in flight.
#[instrument(level = "info", skip_all, fields(concurrency = concurrency))]
pub async fn run_pool<S>(worker: Arc<CrawlWorker>, tasks: S, concurrency: usize) -> PoolReport
where
    S: Stream<Item = CrawlTask>,
{
    let report = tasks
        .map(|task| {
            let worker = Arc::clone(&worker);
            async move {
                let result = worker.process(&task).await;
                if let Err(e) = &result {
                    error!(url = %task.url, error = %e, "Crawl task failed");
                }
                result
            }
        })
        .buffer_unordered(concurrency.max(1))
        .fold(PoolReport::default(), |mut report, result| async move {
            report.record(&result);
            report
        })
        .await;

    info!(
        stored = report.stored,
        duplicates = report.duplicates,
        abandoned = report.abandoned,
        failed = report.failed,
        "Worker pool drained"
    );
    report
}
