//! # up2d8 ingest
//!
//! Article ingestion for a personalized newsletter. Two producers feed one
//! deduplicated article store:
//!
//! - **Topic search**: every subscribed user's topics are searched, URLs the
//!   store has not seen are queued, and crawl workers fetch, extract, and
//!   store each page.
//! - **RSS**: configured feeds are polled, entries are keyword-tagged, and
//!   articles are written to the store or posted to the backend API.
//!
//! ## Usage
//!
//! ```sh
//! up2d8_ingest dispatch | up2d8_ingest work
//! up2d8_ingest rss
//! up2d8_ingest export -o pending.json --mark-processed
//! ```
//!
//! Every article is keyed by its `link`; a unique index makes writes
//! idempotent, so queue redelivery and repeated feed polls never duplicate.
//! Each invocation ends with one summary line on stderr and exits cleanly,
//! whatever happened inside it.

use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::BufReader;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod analytics;
mod backend;
mod cli;
mod config;
mod dispatcher;
mod error;
mod export;
mod extract;
mod fetch;
mod models;
mod queue;
mod rss;
mod search;
mod store;
mod topics;
mod utils;
mod worker;

use analytics::{AnalyticsSink, Fanout, LogAnalytics};
use backend::BackendClient;
use cli::{Cli, Command, Secrets};
use config::{ConfigError, CrawlerSettings, Settings};
use error::AppError;
use fetch::{BrowserlessFetcher, HttpFetcher, PageFetcher};
use models::{CrawlTask, User};
use queue::{line_tasks, ChannelQueue, LineQueue};
use rss::{KeywordTable, RssIngestor};
use search::GoogleSearch;
use store::{ArticleSink, ArticleStore, FeedCatalog, SqliteStore, StaticFeeds, UserDirectory};
use worker::{run_pool, CrawlWorker};

#[tokio::main]
async fn main() {
    // Local development convenience; real deployments set the environment.
    let _ = dotenvy::dotenv();

    // --- Tracing init ---
    // stdout carries queued URLs and exports, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = Instant::now();
    let cli = Cli::parse();
    let command = cli.command.name();
    debug!(command, config = ?cli.config, "Parsed CLI arguments");

    match run(cli).await {
        Ok(summary) => info!(
            command,
            %summary,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Invocation completed"
        ),
        Err(e) => error!(
            command,
            error = %e,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Invocation failed"
        ),
    }
}

/// Run one command, returning its summary for the final log line.
async fn run(cli: Cli) -> Result<Value, AppError> {
    let settings = Settings::load(cli.config.as_deref())?;
    let secrets = cli.secrets;

    match cli.command {
        Command::Dispatch => run_dispatch(&settings, &secrets).await,
        Command::Crawl { url } => run_crawl(&settings, &secrets, url).await,
        Command::Work { concurrency } => run_work(&settings, &secrets, concurrency).await,
        Command::Pipeline { concurrency } => run_pipeline(&settings, &secrets, concurrency).await,
        Command::Rss { via_backend } => run_rss(&settings, &secrets, via_backend).await,
        Command::Export {
            output,
            mark_processed,
        } => run_export(&secrets, output.as_deref(), mark_processed).await,
        Command::InitDb => {
            open_store(&secrets).await?;
            Ok(json!({ "initialized": true }))
        }
        Command::AddUser {
            email,
            topics,
            preference,
        } => {
            let store = open_store(&secrets).await?;
            let user = User {
                email,
                topics,
                preference,
            };
            store.add_user(&user).await?;
            Ok(json!({ "user": user.email, "topics": user.topics }))
        }
        Command::AddFeed { url } => {
            if !utils::is_http_url(&url) {
                return Err(ConfigError::Invalid {
                    name: "url",
                    reason: format!("not an http(s) URL: {url}"),
                }
                .into());
            }
            open_store(&secrets).await?.add_feed(&url).await?;
            Ok(json!({ "feed": url }))
        }
    }
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingSecret(name))
}

async fn open_store(secrets: &Secrets) -> Result<SqliteStore, AppError> {
    let url = require(&secrets.database_url, "DATABASE_URL")?;
    Ok(SqliteStore::connect(url).await?)
}

fn build_search(settings: &Settings, secrets: &Secrets) -> Result<GoogleSearch, AppError> {
    let api_key = require(&secrets.google_api_key, "GOOGLE_API_KEY")?;
    let cse_id = require(&secrets.google_cse_id, "GOOGLE_CSE_ID")?;
    Ok(GoogleSearch::new(
        &settings.search.endpoint,
        api_key.to_string(),
        cse_id.to_string(),
        settings.search.results_per_query,
    )?)
}

fn build_fetcher(
    crawler: &CrawlerSettings,
    secrets: &Secrets,
) -> Result<Arc<dyn PageFetcher>, AppError> {
    match &crawler.browserless_url {
        Some(base_url) => {
            if secrets.browserless_token.is_none() {
                warn!("No BROWSERLESS_TOKEN set; calling the endpoint unauthenticated");
            }
            Ok(Arc::new(BrowserlessFetcher::new(
                base_url,
                secrets.browserless_token.clone(),
                crawler.fetch_timeout(),
            )?))
        }
        None => {
            info!("No Browserless endpoint configured; fetching pages directly");
            Ok(Arc::new(HttpFetcher::new(crawler.fetch_timeout())?))
        }
    }
}

fn build_worker(
    settings: &Settings,
    secrets: &Secrets,
    store: SqliteStore,
) -> Result<Arc<CrawlWorker>, AppError> {
    let fetcher = build_fetcher(&settings.crawler, secrets)?;
    let store: Arc<dyn ArticleStore> = Arc::new(store);
    Ok(Arc::new(CrawlWorker::new(fetcher, store, &settings.crawler)))
}

async fn run_dispatch(settings: &Settings, secrets: &Secrets) -> Result<Value, AppError> {
    let search = build_search(settings, secrets)?;
    let store = open_store(secrets).await?;

    let users = store.users().await?;
    let topics = topics::aggregate_topics(&users);
    info!(users = users.len(), topics = topics.len(), "Aggregated user topics");

    let queue = LineQueue::new(tokio::io::stdout());
    let report = dispatcher::dispatch(&topics, &search, &store, &queue, &settings.search).await?;
    Ok(json!(report))
}

async fn run_crawl(settings: &Settings, secrets: &Secrets, url: String) -> Result<Value, AppError> {
    let worker = build_worker(settings, secrets, open_store(secrets).await?)?;
    let outcome = worker.process(&CrawlTask::new(url)).await?;
    Ok(json!({ "outcome": format!("{outcome:?}") }))
}

async fn run_work(
    settings: &Settings,
    secrets: &Secrets,
    concurrency: Option<usize>,
) -> Result<Value, AppError> {
    let worker = build_worker(settings, secrets, open_store(secrets).await?)?;
    let concurrency = concurrency.unwrap_or(settings.crawler.concurrency).max(1);
    let tasks = line_tasks(BufReader::new(tokio::io::stdin()));
    let report = run_pool(worker, tasks, concurrency).await;
    Ok(json!(report))
}

async fn run_pipeline(
    settings: &Settings,
    secrets: &Secrets,
    concurrency: Option<usize>,
) -> Result<Value, AppError> {
    let search = build_search(settings, secrets)?;
    let store = open_store(secrets).await?;
    // The pool handle is shared; both halves see the same connections.
    let worker = build_worker(settings, secrets, store.clone())?;
    let concurrency = concurrency.unwrap_or(settings.crawler.concurrency).max(1);

    let users = store.users().await?;
    let topics = topics::aggregate_topics(&users);
    info!(users = users.len(), topics = topics.len(), "Aggregated user topics");

    let (queue, tasks) = ChannelQueue::new();
    let (search, store) = (&search, &store);
    let producer = async move {
        let report = dispatcher::dispatch(&topics, search, store, &queue, &settings.search).await;
        // Closing the queue ends the task stream once it is drained.
        drop(queue);
        report
    };
    let (dispatched, crawled) = tokio::join!(producer, run_pool(worker, tasks, concurrency));
    let dispatched = dispatched?;
    Ok(json!({ "dispatch": dispatched, "crawl": crawled }))
}

async fn run_rss(settings: &Settings, secrets: &Secrets, via_backend: bool) -> Result<Value, AppError> {
    let keywords = KeywordTable::from_settings(&settings.rss.tags);
    debug!(tags = keywords.len(), "Loaded keyword table");

    let backend = match &settings.backend.base_url {
        Some(base_url) => Some(BackendClient::new(base_url, secrets.backend_api_key.clone())?),
        None => None,
    };
    let store = if !via_backend || settings.rss.feeds_from_database {
        Some(open_store(secrets).await?)
    } else {
        None
    };

    let sink: &dyn ArticleSink = if via_backend {
        backend.as_ref().ok_or_else(|| ConfigError::Invalid {
            name: "backend.base_url",
            reason: "required when submitting through the backend".to_string(),
        })?
    } else {
        store.as_ref().ok_or(ConfigError::MissingSecret("DATABASE_URL"))?
    };

    let static_feeds = StaticFeeds(settings.rss.feeds.clone());
    let feeds: &dyn FeedCatalog = match (&store, settings.rss.feeds_from_database) {
        (Some(store), true) => store,
        _ => &static_feeds,
    };

    let mut sinks: Vec<&dyn AnalyticsSink> = vec![&LogAnalytics];
    if let Some(backend) = &backend {
        sinks.push(backend);
    }
    let analytics = Fanout(sinks);

    let ingestor = RssIngestor::new(
        &keywords,
        sink,
        std::time::Duration::from_secs(settings.rss.fetch_timeout_secs),
    )?;
    let stats = ingestor.run(feeds, &analytics).await?;
    Ok(json!(stats))
}

async fn run_export(
    secrets: &Secrets,
    output: Option<&std::path::Path>,
    mark_processed: bool,
) -> Result<Value, AppError> {
    let store = open_store(secrets).await?;
    let batch = export::pending_batch(&store).await?;
    export::write_batch(&batch, output)
        .await
        .map_err(|e| AppError::Export(e.to_string()))?;

    let marked = if mark_processed {
        store.mark_processed(&batch.links()).await?
    } else {
        0
    };
    Ok(json!({ "exported": batch.count, "marked_processed": marked }))
}
