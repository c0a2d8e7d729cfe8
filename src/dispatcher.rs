//! Search dispatch: topics in, crawl tasks out.
//!
//! Each topic is searched independently and a failing topic never aborts the
//! batch. Candidates are unioned by exact string, anything already in the
//! store is subtracted, and each survivor is enqueued once.

use crate::config::SearchSettings;
use crate::models::CrawlTask;
use crate::queue::TaskQueue;
use crate::search::SearchApi;
use crate::store::{ArticleStore, StoreError};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{error, info, instrument, warn};

/// Counters for one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub topics: usize,
    pub failed_topics: usize,
    pub candidates: usize,
    pub already_stored: usize,
    pub queued: usize,
    pub failed_enqueues: usize,
}

/// `candidates − existing`.
pub fn filter_new(candidates: &BTreeSet<String>, existing: &HashSet<String>) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|url| !existing.contains(*url))
        .cloned()
        .collect()
}

/// Search every topic and union the candidate URLs.
///
/// Returns the candidates and how many topics failed.
#[instrument(level = "info", skip_all, fields(topics = topics.len()))]
pub async fn collect_candidates(
    topics: &HashSet<String>,
    search: &dyn SearchApi,
    settings: &SearchSettings,
) -> (BTreeSet<String>, usize) {
    let results: Vec<Option<BTreeSet<String>>> = stream::iter(topics.iter())
        .map(|topic| async move {
            let query = settings.query_for(topic);
            info!(%topic, "Searching for articles");
            match search.search(&query).await {
                Ok(results) => {
                    let urls = results.candidate_urls();
                    info!(%topic, count = urls.len(), "Search returned candidates");
                    Some(urls)
                }
                Err(e) => {
                    error!(%topic, error = %e, "Error during search for topic");
                    None
                }
            }
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_none()).count();
    let candidates = results.into_iter().flatten().flatten().collect();
    (candidates, failed)
}

/// Run a full dispatch over `topics`.
///
/// Only a store failure during the existing-link lookup aborts the run, since
/// without it nothing can be safely enqueued.
#[instrument(level = "info", skip_all)]
pub async fn dispatch(
    topics: &HashSet<String>,
    search: &dyn SearchApi,
    store: &dyn ArticleStore,
    queue: &dyn TaskQueue,
    settings: &SearchSettings,
) -> Result<DispatchReport, StoreError> {
    let mut report = DispatchReport {
        topics: topics.len(),
        ..Default::default()
    };
    if topics.is_empty() {
        warn!("No user topics found; nothing to search");
        return Ok(report);
    }

    let (candidates, failed_topics) = collect_candidates(topics, search, settings).await;
    report.failed_topics = failed_topics;
    report.candidates = candidates.len();
    if candidates.is_empty() {
        warn!("Search did not return any URLs");
        return Ok(report);
    }
    info!(count = candidates.len(), "Found total URLs from search");

    let lookup: Vec<String> = candidates.iter().cloned().collect();
    let existing = store.existing_links(&lookup).await?;
    report.already_stored = existing.len();
    info!(count = existing.len(), "Found existing articles in store");

    let fresh = filter_new(&candidates, &existing);
    info!(count = fresh.len(), "Queuing new URLs for crawling");
    for url in fresh {
        match queue.enqueue(CrawlTask::new(url.clone())).await {
            Ok(()) => report.queued += 1,
            Err(e) => {
                error!(%url, error = %e, "Failed to enqueue crawl task");
                report.failed_enqueues += 1;
            }
        }
    }

    Ok(report)
}
