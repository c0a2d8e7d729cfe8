//! Command-line interface definitions.
//!
//! Each subcommand is one entry point of the ingestion pipeline, meant to be
//! triggered on its own schedule (or once per queued URL for `crawl`).
//! Secrets are read from flags or, more usually, the environment.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ingest articles from topic search and RSS feeds into a deduplicated store.
///
/// # Examples
///
/// ```sh
/// # Queue new URLs for every subscribed topic, then crawl them
/// up2d8_ingest dispatch | up2d8_ingest work
///
/// # Both halves in one process
/// up2d8_ingest pipeline
///
/// # Poll the configured feeds through the backend API
/// up2d8_ingest --config up2d8.yaml rss --via-backend
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the YAML settings file
    #[arg(short, long, env = "UP2D8_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub secrets: Secrets,

    #[command(subcommand)]
    pub command: Command,
}

/// Named secrets. Missing ones are only an error for commands that need them.
#[derive(Args, Debug, Default)]
pub struct Secrets {
    /// Article store connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Search API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub google_api_key: Option<String>,

    /// Programmable search engine id
    #[arg(long, env = "GOOGLE_CSE_ID", global = true)]
    pub google_cse_id: Option<String>,

    /// Token for the Browserless endpoint
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true, global = true)]
    pub browserless_token: Option<String>,

    /// Bearer token for the backend ingestion API
    #[arg(long, env = "BACKEND_API_KEY", hide_env_values = true, global = true)]
    pub backend_api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search every subscribed topic and print unseen URLs, one per line
    Dispatch,
    /// Fetch and store a single URL
    Crawl {
        /// The URL to crawl
        url: String,
    },
    /// Crawl URLs read from stdin, one per line
    Work {
        /// Number of pages fetched at once (overrides the settings file)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Dispatch and crawl in one process
    Pipeline {
        /// Number of pages fetched at once (overrides the settings file)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Ingest the configured RSS feeds
    Rss {
        /// Submit articles through the backend API instead of the store
        #[arg(long)]
        via_backend: bool,
    },
    /// Write unprocessed articles as JSON for the newsletter
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mark the exported articles as processed
        #[arg(long)]
        mark_processed: bool,
    },
    /// Create the store schema and the unique index on article links
    InitDb,
    /// Add or replace a subscriber and the topics they follow
    AddUser {
        email: String,

        /// A followed topic; repeat for several
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Newsletter tone preference
        #[arg(long)]
        preference: Option<String>,
    },
    /// Register a feed URL in the store's feed table
    AddFeed { url: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Dispatch => "dispatch",
            Command::Crawl { .. } => "crawl",
            Command::Work { .. } => "work",
            Command::Pipeline { .. } => "pipeline",
            Command::Rss { .. } => "rss",
            Command::Export { .. } => "export",
            Command::InitDb => "init-db",
            Command::AddUser { .. } => "add-user",
            Command::AddFeed { .. } => "add-feed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_parsing() {
        let cli = Cli::parse_from(["up2d8_ingest", "crawl", "https://x.com/1"]);
        match cli.command {
            Command::Crawl { url } => assert_eq!(url, "https://x.com/1"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "up2d8_ingest",
            "work",
            "--concurrency",
            "3",
            "--config",
            "/etc/up2d8.yaml",
            "--database-url",
            "sqlite://articles.db",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/up2d8.yaml")));
        assert_eq!(cli.secrets.database_url.as_deref(), Some("sqlite://articles.db"));
        assert!(matches!(cli.command, Command::Work { concurrency: Some(3) }));
    }

    #[test]
    fn test_export_flags() {
        let cli = Cli::parse_from(["up2d8_ingest", "export", "-o", "out.json", "--mark-processed"]);
        match cli.command {
            Command::Export {
                output,
                mark_processed,
            } => {
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(mark_processed);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rss_backend_flag() {
        let cli = Cli::parse_from(["up2d8_ingest", "rss", "--via-backend"]);
        assert!(matches!(cli.command, Command::Rss { via_backend: true }));
    }

    #[test]
    fn test_add_user_repeated_topics() {
        let cli = Cli::parse_from([
            "up2d8_ingest",
            "add-user",
            "a@example.com",
            "-t",
            "rust",
            "--topic",
            "AI safety",
        ]);
        match cli.command {
            Command::AddUser {
                email,
                topics,
                preference,
            } => {
                assert_eq!(email, "a@example.com");
                assert_eq!(topics, vec!["rust", "AI safety"]);
                assert!(preference.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
