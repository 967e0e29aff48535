// tests/common/mod.rs
//
// In-memory upstreams and a recording delivery target shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use market_feed_notifier::feed::{Cursor, NotificationItem, Page, PageUpstream, SourceProvider};
use market_feed_notifier::notify::{DeliveryReceipt, DeliveryTarget, Payload};

/// Returns scripted results in order; errors once the script runs out.
pub struct ScriptedProvider<T> {
    script: Mutex<VecDeque<Result<T, String>>>,
}

impl<T> ScriptedProvider<T> {
    pub fn new(script: Vec<Result<T, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> SourceProvider<T> for ScriptedProvider<T> {
    async fn fetch_latest(&self) -> Result<T> {
        match self.script.lock().pop_front() {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => Err(anyhow!(e)),
            None => bail!("script exhausted"),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records every payload; fails any payload whose text contains `fail_marker`.
#[derive(Default)]
pub struct RecordingTarget {
    sent: Mutex<Vec<Payload>>,
    fail_marker: Option<String>,
}

impl RecordingTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_marker: Some(marker.to_string()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(Payload::plain_text).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl DeliveryTarget for RecordingTarget {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, payload: &Payload) -> Result<DeliveryReceipt> {
        if let Some(m) = &self.fail_marker {
            if payload.plain_text().contains(m.as_str()) {
                bail!("target rejected payload");
            }
        }
        let mut sent = self.sent.lock();
        sent.push(payload.clone());
        Ok(DeliveryReceipt {
            target: "recording".into(),
            message_id: Some(sent.len().to_string()),
        })
    }

    async fn edit(&self, _receipt: &DeliveryReceipt, _payload: &Payload) -> Result<()> {
        Ok(())
    }
}

pub fn post(id: u64, ts_ms: i64) -> NotificationItem {
    NotificationItem::new(id.to_string(), ts_ms).field("id", id.to_string())
}

#[derive(Debug, Clone)]
pub struct PageCall {
    pub window: Cursor,
    pub token: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    /// Item sets returned for successive windows.
    batches: VecDeque<Vec<NotificationItem>>,
    /// Batch being paged through; re-served from page one if a window fails.
    current: Vec<NotificationItem>,
    window_open: bool,
    calls: Vec<PageCall>,
    fail_calls: HashSet<usize>,
}

/// Paginated upstream: each new window serves the next batch in pages of `page_size`,
/// page tokens are `"p{n}"`. Calls listed in `fail_calls` (0-based) error out.
pub struct MockPages {
    page_size: usize,
    state: Mutex<MockState>,
}

impl MockPages {
    pub fn new(page_size: usize, batches: Vec<Vec<NotificationItem>>) -> Arc<Self> {
        Arc::new(Self {
            page_size,
            state: Mutex::new(MockState {
                batches: batches.into(),
                ..MockState::default()
            }),
        })
    }

    pub fn fail_call(&self, n: usize) {
        self.state.lock().fail_calls.insert(n);
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl PageUpstream for MockPages {
    async fn fetch_page(&self, window: Cursor, page_token: Option<String>) -> Result<Page> {
        let mut st = self.state.lock();
        let call = st.calls.len();
        st.calls.push(PageCall {
            window,
            token: page_token.clone(),
            at: Instant::now(),
        });
        if page_token.is_none() && !st.window_open {
            st.current = st.batches.pop_front().unwrap_or_default();
            st.window_open = true;
        }
        if st.fail_calls.contains(&call) {
            bail!("upstream 503 on call {call}");
        }

        let page_no: usize = match page_token.as_deref() {
            None => 0,
            Some(t) => t.trim_start_matches('p').parse()?,
        };
        let from = page_no * self.page_size;
        let to = (from + self.page_size).min(st.current.len());
        let items = st.current.get(from..to).map(|s| s.to_vec()).unwrap_or_default();
        let next_token = if to < st.current.len() {
            Some(format!("p{}", page_no + 1))
        } else {
            st.window_open = false;
            None
        };
        Ok(Page { items, next_token })
    }
}
