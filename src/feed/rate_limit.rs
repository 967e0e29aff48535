// src/feed/rate_limit.rs
//! Single-worker FIFO queue with a minimum spacing between task starts.
//!
//! Callers `enqueue` futures; one background worker runs them one at a time, in
//! submission order, waiting until `min_interval` has elapsed since the previous
//! task *started* before starting the next one.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Clone)]
pub struct RateLimitedQueue {
    tx: mpsc::UnboundedSender<Job>,
    min_interval: Duration,
}

impl RateLimitedQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn new(min_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            let mut last_start: Option<Instant> = None;
            while let Some(job) = rx.recv().await {
                if let Some(prev) = last_start {
                    tokio::time::sleep_until(prev + min_interval).await;
                }
                last_start = Some(Instant::now());
                // A panicking task must not take the worker down with it.
                if let Err(e) = tokio::spawn(job).await {
                    tracing::error!(target: "feed", error = %e, "rate-limited task panicked");
                }
            }
            tracing::debug!(target: "feed", "rate-limited queue closed");
        });
        Self { tx, min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Queue `task` and wait for its result. A failing task only fails its own caller.
    pub async fn enqueue<F, T>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // The caller may have gone away; nothing to report then.
            let _ = done_tx.send(task.await);
        });
        self.tx
            .send(job)
            .map_err(|_| anyhow!("rate-limited queue worker has stopped"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("rate-limited queue dropped the task"))?
    }
}

impl Default for RateLimitedQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
