//! Web search client and result parsing.
//!
//! The search API is queried once per topic. Its response can arrive in two
//! shapes and both are accepted:
//!
//! - **Items**: structured hits with a `link` field (the Custom Search JSON
//!   API `items` array, or a JSON array of `[snippet, link]` pairs)
//! - **Text**: a rendered list of tuples, e.g. `[('snippet', 'https://…'), …]`
//!
//! Anything that is not an absolute `http(s)` URL is dropped without error.

use crate::utils::{is_http_url, truncate_for_log};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned status {status}: {message}")]
    Api { status: u16, message: String },
}

/// One structured search hit. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// A raw search response in either of the shapes the API may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    Items(Vec<SearchHit>),
    Text(String),
}

impl SearchResults {
    /// Interpret a response body, falling back to the text shape when it is
    /// not a JSON document this module understands.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(mut map)) => {
                let items = match map.remove("items") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                SearchResults::Items(items.into_iter().filter_map(hit_from_value).collect())
            }
            Ok(Value::Array(items)) => {
                SearchResults::Items(items.into_iter().filter_map(hit_from_value).collect())
            }
            Ok(Value::String(text)) => SearchResults::Text(text),
            _ => SearchResults::Text(body.to_string()),
        }
    }

    /// Candidate URLs, deduplicated by exact string.
    pub fn candidate_urls(&self) -> BTreeSet<String> {
        match self {
            SearchResults::Items(hits) => hits
                .iter()
                .filter_map(|hit| hit.link.as_deref())
                .map(str::trim)
                .filter(|link| is_http_url(link))
                .map(str::to_string)
                .collect(),
            SearchResults::Text(text) => links_from_text(text),
        }
    }
}

/// Accepts `{"link": ...}` objects and `[snippet, link]` pairs; anything else
/// is a malformed entry.
fn hit_from_value(value: Value) -> Option<SearchHit> {
    match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        Value::Array(pair) => match pair.as_slice() {
            [Value::String(snippet), Value::String(link), ..] => Some(SearchHit {
                title: None,
                link: Some(link.clone()),
                snippet: Some(snippet.clone()),
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Second element of each `(snippet, link)` tuple, single or double quoted.
static TUPLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\(\s*(?:'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*")\s*,\s*(?:'([^']*)'|"([^"]*)")"#,
    )
    .expect("tuple link pattern is valid")
});

fn links_from_text(text: &str) -> BTreeSet<String> {
    TUPLE_LINK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .filter(|link| is_http_url(link))
        .map(str::to_string)
        .collect()
}

/// Free-text web search.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResults, SearchError>;
}

/// Google Programmable Search (Custom Search JSON API).
pub struct GoogleSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    cse_id: String,
    num: u8,
}

impl GoogleSearch {
    /// Build a search client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Custom Search JSON API URL
    /// * `api_key` - Sent as the `key` query parameter
    /// * `cse_id` - Search engine id, sent as `cx`
    /// * `num` - Results per query, clamped to the API's 1..=10
    pub fn new(endpoint: &str, api_key: String, cse_id: String, num: u8) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            cse_id,
            num: num.clamp(1, 10),
        })
    }
}

#[async_trait]
impl SearchApi for GoogleSearch {
    #[instrument(level = "info", skip(self))]
    async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        let num = self.num.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 300), "Search API error");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: truncate_for_log(&body, 300),
            });
        }

        let results = SearchResults::from_body(&body);
        debug!(?results, "Search results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_items_shape_drops_malformed_entries() {
        let body = r#"{
            "kind": "customsearch#search",
            "items": [
                {"title": "One", "link": "https://x.com/1", "snippet": "first"},
                {"title": "No link"},
                {"title": "Relative", "link": "/about"},
                {"title": "Ftp", "link": "ftp://x.com/file"},
                42,
                {"title": "Two", "link": "http://y.org/2"}
            ]
        }"#;
        let urls = SearchResults::from_body(body).candidate_urls();
        assert_eq!(
            urls,
            BTreeSet::from(["https://x.com/1".to_string(), "http://y.org/2".to_string()])
        );
    }

    #[test]
    fn test_object_without_items_is_empty() {
        let results = SearchResults::from_body(r#"{"kind": "customsearch#search"}"#);
        assert_eq!(results, SearchResults::Items(vec![]));
        assert!(results.candidate_urls().is_empty());
    }

    #[test]
    fn test_pair_array_shape() {
        let body = r#"[["snippet one", "https://x.com/1"], ["only snippet"], ["s", "javascript:void(0)"]]"#;
        let urls = SearchResults::from_body(body).candidate_urls();
        assert_eq!(urls, BTreeSet::from(["https://x.com/1".to_string()]));
    }

    #[test]
    fn test_text_shape() {
        let text = r#"[('Rust 2.0 announced', 'https://x.com/1'), ("It's here", "https://x.com/2"), ('broken entry'), ('bad link', 'notaurl')]"#;
        let results = SearchResults::from_body(text);
        assert!(matches!(results, SearchResults::Text(_)));
        assert_eq!(
            results.candidate_urls(),
            BTreeSet::from(["https://x.com/1".to_string(), "https://x.com/2".to_string()])
        );
    }

    #[test]
    fn test_text_shape_with_escaped_quote_in_snippet() {
        let text = r#"[('The team\'s update', 'https://x.com/3')]"#;
        assert_eq!(
            SearchResults::Text(text.to_string()).candidate_urls(),
            BTreeSet::from(["https://x.com/3".to_string()])
        );
    }

    #[test]
    fn test_garbage_text_yields_nothing() {
        assert!(SearchResults::from_body("No good Google Search Result was found")
            .candidate_urls()
            .is_empty());
    }

    #[test]
    fn test_exact_string_dedup_keeps_variants() {
        // Known limitation: no URL normalization before dedup.
        let body = r#"{"items": [
            {"link": "https://x.com/a"},
            {"link": "https://x.com/a/"},
            {"link": "http://x.com/a"},
            {"link": "https://x.com/a"}
        ]}"#;
        assert_eq!(SearchResults::from_body(body).candidate_urls().len(), 3);
    }

    #[tokio::test]
    async fn test_google_search_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("q", "latest articles about rust"))
            .and(query_param("key", "k"))
            .and(query_param("cx", "cx-id"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items": [{"title": "R", "link": "https://x.com/rust", "snippet": "s"}]}"#,
            ))
            .mount(&server)
            .await;

        let search = GoogleSearch::new(
            &format!("{}/customsearch/v1", server.uri()),
            "k".to_string(),
            "cx-id".to_string(),
            10,
        )
        .unwrap();
        let results = search.search("latest articles about rust").await.unwrap();
        assert_eq!(
            results.candidate_urls(),
            BTreeSet::from(["https://x.com/rust".to_string()])
        );
    }

    #[tokio::test]
    async fn test_google_search_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let search =
            GoogleSearch::new(&server.uri(), "k".to_string(), "cx".to_string(), 10).unwrap();
        let err = search.search("anything").await.unwrap_err();
        assert!(matches!(err, SearchError::Api { status: 429, .. }));
    }
}
