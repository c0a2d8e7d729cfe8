//! Top-level error for one command invocation.

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::rss::FeedError;
use crate::search::SearchError;
use crate::store::StoreError;
use crate::worker::CrawlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("export failed: {0}")]
    Export(String),
}
