//! YAML settings file.
//!
//! Every section is optional; a missing file or a missing key falls back to
//! the defaults below. Secrets never live here, they come from the
//! environment through [`crate::cli::Secrets`].
//!
//! ```yaml
//! search:
//!   query_template: "latest articles about {topic}"
//!   concurrency: 4
//! crawler:
//!   fetch_timeout_secs: 60
//!   summary_lines: 15
//!   concurrency: 8
//!   browserless_url: http://localhost:3000
//! rss:
//!   feeds:
//!     - https://hnrss.org/frontpage
//!   feeds_from_database: false
//!   tags:
//!     AI: [" ai ", "machine learning"]
//! backend:
//!   base_url: https://backend.example.com
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing secret {0}")]
    MissingSecret(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub crawler: CrawlerSettings,
    pub rss: RssSettings,
    pub backend: BackendSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Query sent per topic; `{topic}` is replaced by the topic string.
    pub query_template: String,
    pub endpoint: String,
    /// Number of topics searched at once.
    pub concurrency: usize,
    pub results_per_query: u8,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            query_template: "latest articles about {topic}".to_string(),
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            concurrency: 4,
            results_per_query: 10,
        }
    }
}

impl SearchSettings {
    pub fn query_for(&self, topic: &str) -> String {
        self.query_template.replace("{topic}", topic)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub fetch_timeout_secs: u64,
    pub summary_lines: usize,
    /// Number of crawl workers running at once in `work` and `pipeline`.
    pub concurrency: usize,
    /// Browserless endpoint for rendered HTML. Plain HTTP GET when unset.
    pub browserless_url: Option<String>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 60,
            summary_lines: 15,
            concurrency: 8,
            browserless_url: None,
        }
    }
}

impl CrawlerSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RssSettings {
    pub feeds: Vec<String>,
    /// Read feed URLs from the `feeds` table instead of `feeds`.
    pub feeds_from_database: bool,
    pub fetch_timeout_secs: u64,
    /// Tag name to keyword list. The built-in table is used when empty.
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Default for RssSettings {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            feeds_from_database: false,
            fetch_timeout_secs: 15,
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: Option<String>,
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No settings file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), feeds = settings.rss.feeds.len(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "search.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.crawler.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "crawler.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.crawler.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "crawler.fetch_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.rss.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "rss.fetch_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
