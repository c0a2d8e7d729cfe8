//! The dedup store and the read-only collections next to it.
//!
//! Both ingestion paths converge here. The only correctness mechanism for
//! duplicates is the unique index on `articles.link`: concurrent writers race
//! on insert and the loser gets [`InsertOutcome::AlreadyExists`].

use crate::models::{Article, InsertOutcome, User};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

pub mod sqlite;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown article source {0:?}")]
    UnknownSource(String),
}

/// The article collection.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Establish uniqueness on `link`. Safe to call on every start.
    async fn ensure_link_index(&self) -> Result<(), StoreError>;

    /// Which of `links` are already stored.
    async fn existing_links(&self, links: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Insert one article. A duplicate `link` is an outcome, not an error.
    async fn insert(&self, article: &Article) -> InsertOutcome;

    /// Articles not yet picked up by the newsletter consumer.
    async fn find_unprocessed(&self) -> Result<Vec<Article>, StoreError>;

    /// Flag the given links as processed, returning how many rows changed.
    async fn mark_processed(&self, links: &[String]) -> Result<u64, StoreError>;
}

/// The user collection.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users(&self) -> Result<Vec<User>, StoreError>;
}

/// Where configured feed URLs come from.
#[async_trait]
pub trait FeedCatalog: Send + Sync {
    async fn feed_urls(&self) -> Result<Vec<String>, StoreError>;
}

/// Feeds listed in the settings file.
#[derive(Debug, Clone, Default)]
pub struct StaticFeeds(pub Vec<String>);

#[async_trait]
impl FeedCatalog for StaticFeeds {
    async fn feed_urls(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.0.clone())
    }
}

/// Something an ingestion path can hand an article to.
///
/// Every [`ArticleStore`] is one; the backend API is the other.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn submit(&self, article: &Article) -> InsertOutcome;
}

#[async_trait]
impl<S: ArticleStore + ?Sized> ArticleSink for S {
    async fn submit(&self, article: &Article) -> InsertOutcome {
        self.insert(article).await
    }
}
