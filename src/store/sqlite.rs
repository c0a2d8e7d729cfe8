//! SQLite-backed dedup store.
//!
//! Tags and user topics are stored as JSON arrays in TEXT columns. The unique
//! index on `articles.link` is created by [`ArticleStore::ensure_link_index`],
//! which [`SqliteStore::connect`] runs once per process.

use super::{ArticleStore, FeedCatalog, StoreError, UserDirectory};
use crate::models::{Article, ArticleSource, InsertOutcome, User};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// SQLite caps bound parameters per statement; stay well below it.
const IN_CLAUSE_CHUNK: usize = 500;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        link TEXT NOT NULL,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        content TEXT,
        published TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        processed INTEGER NOT NULL DEFAULT 0,
        source TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        email TEXT PRIMARY KEY,
        topics TEXT NOT NULL DEFAULT '[]',
        preference TEXT
    )",
    "CREATE TABLE IF NOT EXISTS feeds (
        url TEXT PRIMARY KEY
    )",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and prepare the schema.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        // Concurrent workers race on the link index; writers wait for the
        // file lock instead of failing with SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        store.ensure_link_index().await?;
        info!("Connected to article store");
        Ok(store)
    }

    /// A private in-memory database, held on a single connection so it lives
    /// as long as the store.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        store.ensure_link_index().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert or replace a subscriber, keyed by email.
    pub async fn add_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (email, topics, preference) VALUES (?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET topics = excluded.topics, preference = excluded.preference",
        )
        .bind(&user.email)
        .bind(serde_json::to_string(&user.topics)?)
        .bind(&user.preference)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_feed(&self, url: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO feeds (url) VALUES (?) ON CONFLICT(url) DO NOTHING")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn count_articles(&self, link: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE link = ?")
            .bind(link)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn try_insert(&self, article: &Article) -> Result<(), sqlx::Error> {
        let tags = serde_json::to_string(&article.tags)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO articles (link, title, summary, content, published, tags, processed, source)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&article.link)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.published)
        .bind(tags)
        .bind(article.processed)
        .bind(article.source.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn article_from_row(row: &SqliteRow) -> Result<Article, StoreError> {
    let tags: String = row.try_get("tags")?;
    let source: String = row.try_get("source")?;
    Ok(Article {
        link: row.try_get("link")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        published: row.try_get("published")?,
        tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
        processed: row.try_get("processed")?,
        source: ArticleSource::parse(&source).ok_or(StoreError::UnknownSource(source))?,
    })
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn ensure_link_index(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_link ON articles (link)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(candidates = links.len()))]
    async fn existing_links(&self, links: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut existing = HashSet::new();
        for chunk in links.chunks(IN_CLAUSE_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT link FROM articles WHERE link IN (");
            let mut separated = query.separated(", ");
            for link in chunk {
                separated.push_bind(link);
            }
            separated.push_unseparated(")");
            let rows = query.build().fetch_all(&self.pool).await?;
            for row in rows {
                existing.insert(row.try_get::<String, _>("link")?);
            }
        }
        debug!(existing = existing.len(), "Looked up existing links");
        Ok(existing)
    }

    async fn insert(&self, article: &Article) -> InsertOutcome {
        match self.try_insert(article).await {
            Ok(()) => InsertOutcome::Inserted,
            Err(e) if is_duplicate_key(&e) => InsertOutcome::AlreadyExists,
            Err(e) => {
                error!(link = %article.link, error = %e, "Article insert failed");
                InsertOutcome::Failed(e.to_string())
            }
        }
    }

    async fn find_unprocessed(&self) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query(
            "SELECT link, title, summary, content, published, tags, processed, source
             FROM articles WHERE processed = 0 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(article_from_row).collect()
    }

    async fn mark_processed(&self, links: &[String]) -> Result<u64, StoreError> {
        let mut changed = 0;
        for chunk in links.chunks(IN_CLAUSE_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE articles SET processed = 1 WHERE link IN (");
            let mut separated = query.separated(", ");
            for link in chunk {
                separated.push_bind(link);
            }
            separated.push_unseparated(")");
            changed += query.build().execute(&self.pool).await?.rows_affected();
        }
        Ok(changed)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("SELECT email, topics, preference FROM users")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<User, StoreError> {
                let topics: String = row.try_get("topics")?;
                Ok(User {
                    email: row.try_get("email")?,
                    topics: serde_json::from_str(&topics)?,
                    preference: row.try_get("preference")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FeedCatalog for SqliteStore {
    async fn feed_urls(&self) -> Result<Vec<String>, StoreError> {
        let urls = sqlx::query_scalar("SELECT url FROM feeds ORDER BY url")
            .fetch_all(&self.pool)
            .await?;
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArticleSink;

    fn article(link: &str) -> Article {
        Article {
            link: link.to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            content: None,
            published: "2025-05-06T10:00:00+00:00".to_string(),
            tags: BTreeSet::from(["AI".to_string(), "Cloud".to_string()]),
            processed: false,
            source: ArticleSource::Rss,
        }
    }

    #[tokio::test]
    async fn test_duplicate_link_is_already_exists() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.insert(&article("https://x.com/1")).await, InsertOutcome::Inserted);
        assert_eq!(
            store.insert(&article("https://x.com/1")).await,
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.count_articles("https://x.com/1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ensure_link_index_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.ensure_link_index().await.unwrap();
        store.ensure_link_index().await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_links() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&article("https://x.com/1")).await;
        let existing = store
            .existing_links(&["https://x.com/1".to_string(), "https://x.com/2".to_string()])
            .await
            .unwrap();
        assert_eq!(existing, HashSet::from(["https://x.com/1".to_string()]));
        assert!(store.existing_links(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_and_mark_processed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut crawled = article("https://x.com/2");
        crawled.content = Some("full body".to_string());
        crawled.source = ArticleSource::IntelligentCrawler;
        store.insert(&article("https://x.com/1")).await;
        store.submit(&crawled).await;

        let pending = store.find_unprocessed().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], article("https://x.com/1"));
        assert_eq!(pending[1], crawled);

        let changed = store
            .mark_processed(&["https://x.com/1".to_string()])
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let pending = store.find_unprocessed().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].link, "https://x.com/2");
    }

    #[tokio::test]
    async fn test_users_and_feeds() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .add_user(&User {
                email: "a@example.com".to_string(),
                topics: vec!["rust".to_string(), "ai".to_string()],
                preference: Some("concise".to_string()),
            })
            .await
            .unwrap();
        store.add_feed("https://example.com/feed.xml").await.unwrap();
        store.add_feed("https://example.com/feed.xml").await.unwrap();

        let users = store.users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].topics, vec!["rust", "ai"]);
        assert_eq!(users[0].preference.as_deref(), Some("concise"));
        assert_eq!(
            store.feed_urls().await.unwrap(),
            vec!["https://example.com/feed.xml"]
        );
    }
}
