//! Data models shared by the ingestion paths.
//!
//! - [`Article`]: the canonical stored entity, unique by `link`
//! - [`User`]: a newsletter subscriber and the topics they follow
//! - [`CrawlTask`]: one queued URL waiting to be fetched
//! - [`InsertOutcome`]: the tagged result of an idempotent insert

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which ingestion path produced an [`Article`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSource {
    /// Polled from a configured RSS/Atom feed.
    Rss,
    /// Discovered through topic search and fetched by a crawl worker.
    IntelligentCrawler,
}

impl ArticleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleSource::Rss => "rss",
            ArticleSource::IntelligentCrawler => "intelligent_crawler",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rss" => Some(ArticleSource::Rss),
            "intelligent_crawler" => Some(ArticleSource::IntelligentCrawler),
            _ => None,
        }
    }
}

impl fmt::Display for ArticleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized article as stored in the dedup store.
///
/// `link` is the dedup key. The store rejects a second article with the same
/// link; ingestion paths see that as [`InsertOutcome::AlreadyExists`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    pub link: String,
    pub title: String,
    pub summary: String,
    /// Full extracted text. Only the crawl path fills this in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// RFC 3339 timestamp, or whatever the source provided.
    pub published: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Flipped by the newsletter consumer once the article has been sent.
    #[serde(default)]
    pub processed: bool,
    pub source: ArticleSource,
}

impl Article {
    /// Build an article from a crawled page, stamped with the current time.
    pub fn crawled(link: &str, title: String, summary: String, content: String) -> Self {
        Self {
            link: link.to_string(),
            title,
            summary,
            content: Some(content),
            published: Utc::now().to_rfc3339(),
            tags: BTreeSet::new(),
            processed: false,
            source: ArticleSource::IntelligentCrawler,
        }
    }
}

/// A subscriber. The ingestion paths only read these.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Newsletter tone preference; carried through for the consumer.
    #[serde(default)]
    pub preference: Option<String>,
}

/// One URL placed on the work queue.
///
/// On the wire the task is exactly the URL, with no envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrawlTask {
    pub url: String,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Parse a queue message body. Blank messages carry no task.
    pub fn from_message(body: &str) -> Option<Self> {
        let url = body.trim();
        (!url.is_empty()).then(|| Self::new(url))
    }

    pub fn as_message(&self) -> &str {
        &self.url
    }
}

/// Result of an idempotent insert against the dedup store or the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The `link` uniqueness constraint rejected the write.
    AlreadyExists,
    Failed(String),
}
