//! RSS/Atom ingestion.
//!
//! Runs independently of the search path. Feeds are fetched and parsed one by
//! one; a feed that cannot be fetched or parsed is skipped and the run moves
//! on. Entries are tagged with the [`KeywordTable`] and handed to an
//! [`ArticleSink`], which is either the store or the backend API.

use crate::analytics::AnalyticsSink;
use crate::models::{Article, ArticleSource, InsertOutcome};
use crate::store::{ArticleSink, FeedCatalog, StoreError};
use crate::utils::is_http_url;
use chrono::Utc;
use feed_rs::model::Entry;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub mod tagging;

pub use tagging::KeywordTable;

pub const RUN_COMPLETED_EVENT: &str = "rss_ingestion_completed";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    Status(u16),
    #[error("malformed feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Counters for one ingestion run, reported as a single analytics record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RssRunStats {
    /// Every feed attempted, including the ones that were skipped.
    pub feeds_processed: usize,
    pub feeds_failed: usize,
    pub created: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Polls feeds and submits tagged articles to a sink.
pub struct RssIngestor<'a> {
    client: reqwest::Client,
    keywords: &'a KeywordTable,
    sink: &'a dyn ArticleSink,
}

impl<'a> RssIngestor<'a> {
    /// Each feed request is bounded by `fetch_timeout`.
    pub fn new(
        keywords: &'a KeywordTable,
        sink: &'a dyn ArticleSink,
        fetch_timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("up2d8_ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            keywords,
            sink,
        })
    }

    async fn fetch_feed(&self, url: &str) -> Result<feed_rs::model::Feed, FeedError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        Ok(feed_rs::parser::parse(&bytes[..])?)
    }

    /// Turn one feed entry into an article. Entries without a usable link
    /// cannot be deduplicated and yield `None`.
    ///
    /// Atom entries may list `self`, `replies` or `enclosure` links ahead of
    /// the article itself, so the `alternate` (or untyped) link wins and the
    /// first link is only a fallback.
    pub fn article_from_entry(&self, entry: Entry) -> Option<Article> {
        let link = entry
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| entry.links.first())
            .map(|l| l.href.trim().to_string())
            .filter(|href| is_http_url(href))
            .or_else(|| is_http_url(&entry.id).then(|| entry.id.clone()))?;

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        let summary = entry
            .summary
            .map(|t| t.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let published = entry
            .published
            .or(entry.updated)
            .unwrap_or_else(Utc::now)
            .to_rfc3339();
        let tags = self.keywords.tags_for(&title, &summary);

        Some(Article {
            link,
            title,
            summary,
            content: None,
            published,
            tags,
            processed: false,
            source: ArticleSource::Rss,
        })
    }

    /// Ingest every entry of one feed into `stats`. Feed-level failures are
    /// returned; entry-level failures are only counted.
    #[instrument(level = "info", skip(self, stats))]
    async fn ingest_feed(&self, feed_url: &str, stats: &mut RssRunStats) -> Result<(), FeedError> {
        let feed = self.fetch_feed(feed_url).await?;
        info!(entries = feed.entries.len(), "Parsed feed");

        for entry in feed.entries {
            let entry_id = entry.id.clone();
            let Some(article) = self.article_from_entry(entry) else {
                warn!(entry = %entry_id, "Feed entry has no usable link; skipping");
                stats.failed += 1;
                continue;
            };
            match self.sink.submit(&article).await {
                InsertOutcome::Inserted => {
                    debug!(link = %article.link, tags = ?article.tags, "Created article");
                    stats.created += 1;
                }
                InsertOutcome::AlreadyExists => {
                    debug!(link = %article.link, "Article already exists");
                    stats.duplicate += 1;
                }
                InsertOutcome::Failed(reason) => {
                    error!(link = %article.link, %reason, "Failed to store feed entry");
                    stats.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Ingest every feed in `feeds`, then record the run summary.
    ///
    /// Only a failure to read the feed list itself is returned.
    #[instrument(level = "info", skip_all)]
    pub async fn run(
        &self,
        feeds: &dyn FeedCatalog,
        analytics: &dyn AnalyticsSink,
    ) -> Result<RssRunStats, StoreError> {
        let started = Instant::now();
        let mut stats = RssRunStats::default();

        let feed_urls = feeds.feed_urls().await?;
        if feed_urls.is_empty() {
            warn!("No feeds configured; nothing to ingest");
        }

        for feed_url in &feed_urls {
            stats.feeds_processed += 1;
            if let Err(e) = self.ingest_feed(feed_url, &mut stats).await {
                error!(feed = %feed_url, error = %e, "Skipping feed");
                stats.feeds_failed += 1;
            }
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            feeds_processed = stats.feeds_processed,
            feeds_failed = stats.feeds_failed,
            created = stats.created,
            duplicate = stats.duplicate,
            failed = stats.failed,
            elapsed_ms = stats.elapsed_ms,
            "RSS ingestion finished"
        );
        match serde_json::to_value(&stats) {
            Ok(payload) => analytics.record(RUN_COMPLETED_EVENT, payload).await,
            Err(e) => warn!(error = %e, "Could not encode run summary"),
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::LogAnalytics;
    use crate::store::{ArticleStore, SqliteStore, StaticFeeds};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
        <channel>
            <title>Test Feed</title>
            <link>http://localhost/test</link>
            <description>A feed for testing.</description>
            <item>
                <title>New AI breakthrough</title>
                <link>https://news.example.com/ai</link>
                <description>Researchers publish results.</description>
                <pubDate>Tue, 06 May 2025 10:00:00 GMT</pubDate>
            </item>
            <item>
                <title>Gardening tips</title>
                <link>https://news.example.com/garden</link>
                <description></description>
            </item>
            <item>
                <title>No link here</title>
                <description>Orphaned entry.</description>
            </item>
        </channel>
        </rss>"#;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Value)>>);

    #[async_trait]
    impl AnalyticsSink for Recorder {
        async fn record(&self, event_name: &str, payload: Value) {
            self.0.lock().unwrap().push((event_name.to_string(), payload));
        }
    }

    async fn feed_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FEED)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("this is not valid xml"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_malformed_feed_is_skipped_and_counted() {
        let server = feed_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let feeds = StaticFeeds(vec![
            format!("{}/broken.xml", server.uri()),
            format!("{}/good.xml", server.uri()),
            format!("{}/gone.xml", server.uri()),
        ]);
        let recorder = Recorder::default();

        let stats = ingestor.run(&feeds, &recorder).await.unwrap();

        assert_eq!(stats.feeds_processed, 3);
        assert_eq!(stats.feeds_failed, 2);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.duplicate, 0);
        assert_eq!(stats.failed, 1);

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, RUN_COMPLETED_EVENT);
        assert_eq!(events[0].1["created"], 2);
        assert!(events[0].1.get("elapsed_ms").is_some());
    }

    #[tokio::test]
    async fn test_second_run_counts_duplicates() {
        let server = feed_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let feeds = StaticFeeds(vec![format!("{}/good.xml", server.uri())]);

        ingestor.run(&feeds, &LogAnalytics).await.unwrap();
        let stats = ingestor.run(&feeds, &LogAnalytics).await.unwrap();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.duplicate, 2);
        assert_eq!(store.count_articles("https://news.example.com/ai").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stored_entries_are_tagged() {
        let server = feed_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let feeds = StaticFeeds(vec![format!("{}/good.xml", server.uri())]);
        ingestor.run(&feeds, &LogAnalytics).await.unwrap();

        let articles = store.find_unprocessed().await.unwrap();
        let ai = articles
            .iter()
            .find(|a| a.link == "https://news.example.com/ai")
            .unwrap();
        assert!(ai.tags.contains("AI"));
        assert_eq!(ai.source, ArticleSource::Rss);
        assert_eq!(ai.content, None);
        assert!(ai.published.starts_with("2025-05-06T10:00:00"));
        let garden = articles
            .iter()
            .find(|a| a.link == "https://news.example.com/garden")
            .unwrap();
        assert!(garden.tags.is_empty());
        assert_eq!(garden.summary, "");
    }

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
            <title>Atom Feed</title>
            <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
            <updated>2025-05-06T10:00:00Z</updated>
            <entry>
                <title>Chip shortage eases</title>
                <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
                <updated>2025-05-06T10:00:00Z</updated>
                <link rel="self" href="https://news.example.com/api/entries/1"/>
                <link rel="replies" href="https://news.example.com/comments/1"/>
                <link rel="alternate" href="https://news.example.com/chips"/>
            </entry>
            <entry>
                <title>Only a self link</title>
                <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6b</id>
                <updated>2025-05-06T10:00:00Z</updated>
                <link rel="self" href="https://news.example.com/api/entries/2"/>
            </entry>
        </feed>"#;

    #[tokio::test]
    async fn test_atom_entry_prefers_alternate_link() {
        let store = SqliteStore::in_memory().await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let feed = feed_rs::parser::parse(ATOM.as_bytes()).unwrap();
        let mut entries = feed.entries.into_iter();

        let chips = ingestor.article_from_entry(entries.next().unwrap()).unwrap();
        assert_eq!(chips.link, "https://news.example.com/chips");
        assert!(chips.tags.contains("Hardware"));

        let fallback = ingestor.article_from_entry(entries.next().unwrap()).unwrap();
        assert_eq!(fallback.link, "https://news.example.com/api/entries/2");
    }

    #[tokio::test]
    async fn test_empty_feed_list() {
        let store = SqliteStore::in_memory().await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let recorder = Recorder::default();
        let stats = ingestor.run(&StaticFeeds::default(), &recorder).await.unwrap();
        assert_eq!(stats.feeds_processed, 0);
        assert_eq!(stats.created, 0);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feeds_from_store_catalog() {
        let server = feed_server().await;
        let store = SqliteStore::in_memory().await.unwrap();
        store.add_feed(&format!("{}/good.xml", server.uri())).await.unwrap();
        let keywords = KeywordTable::default();
        let ingestor = RssIngestor::new(&keywords, &store, Duration::from_secs(5)).unwrap();
        let stats = ingestor.run(&store, &LogAnalytics).await.unwrap();
        assert_eq!(stats.feeds_processed, 1);
        assert_eq!(stats.created, 2);
    }
}
