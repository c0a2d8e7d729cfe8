//! Run summaries as analytics events.
//!
//! Every run ends with one structured record. It always goes to the log; when
//! a backend is configured it is also posted there by
//! [`crate::backend::BackendClient`]. Recording never fails the caller.
//!
//! | Event | Payload |
//! |-------|---------|
//! | `rss_ingestion_completed` | [`crate::rss::RssRunStats`] |

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Receiver for per-run analytics events. Recording never fails the run.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event_name: &str, payload: Value);
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnalytics;

#[async_trait]
impl AnalyticsSink for LogAnalytics {
    async fn record(&self, event_name: &str, payload: Value) {
        info!(event = event_name, %payload, "Analytics event");
    }
}

/// Fans one event out to several sinks, in order.
pub struct Fanout<'a>(pub Vec<&'a dyn AnalyticsSink>);

#[async_trait]
impl AnalyticsSink for Fanout<'_> {
    async fn record(&self, event_name: &str, payload: Value) {
        for sink in &self.0 {
            sink.record(event_name, payload.clone()).await;
        }
    }
}
