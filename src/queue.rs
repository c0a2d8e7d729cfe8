//! Work queue transports for [`CrawlTask`]s.
//!
//! A message is exactly the target URL. Delivery is at-least-once from the
//! consumer's point of view; the unique index on `link` makes redelivery
//! harmless.

use crate::models::CrawlTask;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue consumer has gone away")]
    Closed,
    #[error("queue write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for crawl tasks produced by the dispatcher.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: CrawlTask) -> Result<(), QueueError>;
}

/// In-process queue feeding a worker pool running in the same invocation.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<CrawlTask>,
}

impl ChannelQueue {
    /// The queue and the stream of tasks it delivers. The stream ends once
    /// every clone of the queue has been dropped.
    pub fn new() -> (Self, impl Stream<Item = CrawlTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tasks = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|task| (task, rx))
        });
        (Self { tx }, tasks)
    }
}

#[async_trait]
impl TaskQueue for ChannelQueue {
    async fn enqueue(&self, task: CrawlTask) -> Result<(), QueueError> {
        self.tx.send(task).map_err(|_| QueueError::Closed)
    }
}

/// Writes one URL per line, for piping `dispatch` into `work`.
pub struct LineQueue<W> {
    writer: Mutex<W>,
}

impl<W> LineQueue<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap `writer`; lines from concurrent enqueues never interleave.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> TaskQueue for LineQueue<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn enqueue(&self, task: CrawlTask) -> Result<(), QueueError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(task.as_message().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Tasks read one per line; blank lines are skipped and a read error ends the
/// stream.
pub fn line_tasks<R>(reader: R) -> impl Stream<Item = CrawlTask>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(task) = CrawlTask::from_message(&line) {
                        return Some((task, lines));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!(error = %e, "Failed reading task stream");
                    return None;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_line_queue_writes_bare_urls() {
        let queue = LineQueue::new(Vec::new());
        queue.enqueue(CrawlTask::new("https://x.com/1")).await.unwrap();
        queue.enqueue(CrawlTask::new("https://x.com/2")).await.unwrap();
        let written = String::from_utf8(queue.into_inner()).unwrap();
        assert_eq!(written, "https://x.com/1\nhttps://x.com/2\n");
    }

    #[tokio::test]
    async fn test_line_tasks_skip_blank_lines() {
        let input: &[u8] = b"https://x.com/1\n\n   \nhttps://x.com/2\n";
        let tasks: Vec<CrawlTask> = line_tasks(input).collect().await;
        assert_eq!(
            tasks,
            vec![CrawlTask::new("https://x.com/1"), CrawlTask::new("https://x.com/2")]
        );
    }

    #[tokio::test]
    async fn test_channel_queue_ends_when_dropped() {
        let (queue, tasks) = ChannelQueue::new();
        queue.enqueue(CrawlTask::new("https://x.com/1")).await.unwrap();
        drop(queue);
        let tasks: Vec<CrawlTask> = tasks.collect().await;
        assert_eq!(tasks, vec![CrawlTask::new("https://x.com/1")]);
    }
}
