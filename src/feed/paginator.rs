// src/feed/paginator.rs
//! Cursor-driven pagination over a rate-limited upstream, and the continuous
//! feed that carries the cursor from one cycle to the next.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::feed::rate_limit::RateLimitedQueue;
use crate::feed::seed::{DedupSeedGuard, SeenSet};
use crate::feed::types::{sort_chronologically, CycleOutcome, FeedCycle, NotificationItem};

pub const DEFAULT_MAX_PAGES: usize = 100;

/// Half-open time window `[start, end)` requested from a paginated upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Cursor {
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// One page of results and the token for the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<NotificationItem>,
    pub next_token: Option<String>,
}

#[async_trait::async_trait]
pub trait PageUpstream: Send + Sync + 'static {
    async fn fetch_page(&self, window: Cursor, page_token: Option<String>) -> Result<Page>;
}

pub struct CursorPaginator {
    upstream: Arc<dyn PageUpstream>,
    queue: RateLimitedQueue,
    lag: ChronoDuration,
    max_pages: usize,
}

impl CursorPaginator {
    pub fn new(upstream: Arc<dyn PageUpstream>, queue: RateLimitedQueue, lag: ChronoDuration) -> Self {
        Self {
            upstream,
            queue,
            lag,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Drain everything in `[start, now - lag)`. Returns the items and the window end,
    /// which becomes the next cycle's start. All-or-nothing: any page failure fails the call.
    pub async fn fetch_all(&self, start: DateTime<Utc>) -> Result<(Vec<NotificationItem>, DateTime<Utc>)> {
        let end = (Utc::now() - self.lag).max(start);
        let window = Cursor { start, end };
        let items = self.fetch_window(window).await?;
        Ok((items, end))
    }

    pub async fn fetch_window(&self, window: Cursor) -> Result<Vec<NotificationItem>> {
        let mut items = Vec::new();
        if window.is_empty() {
            return Ok(items);
        }

        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let upstream = Arc::clone(&self.upstream);
            let page_token = token.clone();
            let page = self
                .queue
                .enqueue(async move { upstream.fetch_page(window, page_token).await })
                .await
                .with_context(|| format!("fetching page {} of window {} .. {}", pages + 1, window.start, window.end))?;
            pages += 1;
            items.extend(page.items);

            match page.next_token {
                None => break,
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    bail!("upstream repeated page token {next:?}");
                }
                Some(next) => token = Some(next),
            }
            if pages >= self.max_pages {
                bail!("pagination exceeded {} pages", self.max_pages);
            }
        }

        tracing::debug!(target: "feed", pages, items = items.len(), "window drained");
        Ok(items)
    }
}

/// Continuous source state: the cursor start plus the seed guard.
pub struct CursorFeed {
    name: String,
    paginator: CursorPaginator,
    cursor_start: DateTime<Utc>,
    guard: DedupSeedGuard,
}

impl CursorFeed {
    /// `boot_lookback` positions the first window shortly before boot; that first
    /// successful window is seed-only.
    pub fn new(name: impl Into<String>, paginator: CursorPaginator, boot_lookback: ChronoDuration) -> Self {
        Self::starting_at(name, paginator, Utc::now() - boot_lookback)
    }

    pub fn starting_at(name: impl Into<String>, paginator: CursorPaginator, start: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            paginator,
            cursor_start: start,
            guard: DedupSeedGuard::new(),
        }
    }

    pub fn cursor_start(&self) -> DateTime<Utc> {
        self.cursor_start
    }
}

#[async_trait::async_trait]
impl FeedCycle for CursorFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        let (items, end) = self.paginator.fetch_all(self.cursor_start).await?;

        // Windows never overlap, so per-cycle dedup is enough to cover repeated pages.
        let mut items = SeenSet::new().retain_unseen(items);
        sort_chronologically(&mut items);

        self.cursor_start = self.cursor_start.max(end);

        if self.guard.seed_if_first() {
            return Ok(CycleOutcome::Seeded {
                observed: items.len(),
            });
        }
        Ok(CycleOutcome::Items(items))
    }
}
