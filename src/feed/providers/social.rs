// src/feed/providers/social.rs
//! Recent-search social posts, drained page by page through the rate-limited
//! paginator on a continuous cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, SubsecRound, Utc};
use serde::Deserialize;

use super::{fetch_text, source_secret};
use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::normalize_text;
use crate::feed::paginator::{Cursor, CursorFeed, CursorPaginator, Page, PageUpstream, DEFAULT_MAX_PAGES};
use crate::feed::rate_limit::RateLimitedQueue;
use crate::feed::types::{FeedCycle, NotificationItem};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.x.com/2/tweets/search/recent";
pub const MAX_PAGE_SIZE: u32 = 100;
// The search API rejects smaller pages.
pub const MIN_PAGE_SIZE: u32 = 10;

// Post ids are snowflakes: millis since this epoch, shifted left by 22 bits.
const SNOWFLAKE_EPOCH_MS: i64 = 1_288_834_974_657;

fn default_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.to_string()
}
fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}
fn default_min_interval_ms() -> u64 {
    1_000
}
fn default_lag_secs() -> i64 {
    10
}
fn default_lookback_secs() -> i64 {
    10
}
fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclude {
    Retweets,
    Replies,
}

impl Exclude {
    fn operator(self) -> &'static str {
        match self {
            Exclude::Retweets => "-is:retweet",
            Exclude::Replies => "-is:reply",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocialOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub bearer_token_env: String,
    pub query: String,
    #[serde(default)]
    pub exclude: Vec<Exclude>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_lag_secs")]
    pub lag_secs: i64,
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: i64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl SocialOptions {
    /// Query with exclusion operators appended.
    pub fn full_query(&self) -> String {
        let mut q = self.query.trim().to_string();
        for ex in &self.exclude {
            let op = ex.operator();
            if !q.contains(op) {
                q.push(' ');
                q.push_str(op);
            }
        }
        q
    }
}

#[derive(Debug, Clone)]
pub struct SocialSettings {
    pub options: SocialOptions,
    pub bearer_token: String,
}

impl SocialSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let options: SocialOptions = cfg.options_as()?;
        if options.query.trim().is_empty() {
            return Err(ConfigError::options(&cfg.name, "`query` must not be empty"));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&options.page_size) {
            return Err(ConfigError::options(
                &cfg.name,
                format!("`page_size` must be within {MIN_PAGE_SIZE}..={MAX_PAGE_SIZE}"),
            ));
        }
        if options.lag_secs < 0 || options.lookback_secs < 0 {
            return Err(ConfigError::options(&cfg.name, "`lag_secs` and `lookback_secs` must be >= 0"));
        }
        if options.max_pages == 0 {
            return Err(ConfigError::options(&cfg.name, "`max_pages` must be > 0"));
        }
        let bearer_token = source_secret(&cfg.name, &options.bearer_token_env)?;
        Ok(Self { options, bearer_token })
    }

    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        let o = &self.options;
        let upstream = SocialSearchUpstream {
            client: http.clone(),
            endpoint: o.endpoint.clone(),
            bearer_token: self.bearer_token.clone(),
            query: o.full_query(),
            page_size: o.page_size,
        };
        let queue = RateLimitedQueue::new(Duration::from_millis(o.min_interval_ms));
        let paginator = CursorPaginator::new(Arc::new(upstream), queue, ChronoDuration::seconds(o.lag_secs))
            .with_max_pages(o.max_pages);
        Box::new(CursorFeed::new(name, paginator, ChronoDuration::seconds(o.lookback_secs)))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Post>,
    #[serde(default)]
    includes: Includes,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    author_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    next_token: Option<String>,
}

fn snowflake_millis(id: &str) -> Option<i64> {
    let n: i64 = id.parse().ok()?;
    Some((n >> 22) + SNOWFLAKE_EPOCH_MS)
}

fn post_millis(post: &Post) -> i64 {
    post.created_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.timestamp_millis())
        .or_else(|| snowflake_millis(&post.id))
        .unwrap_or_default()
}

/// Parse one search page. Authors are resolved through `includes.users`.
pub fn parse_search_page(body: &str) -> Result<Page> {
    let rsp: SearchResponse = serde_json::from_str(body).context("parsing search page json")?;
    let users: HashMap<&str, &str> = rsp
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();

    let items = rsp
        .data
        .iter()
        .filter(|p| !p.id.trim().is_empty())
        .map(|p| {
            let ms = post_millis(p);
            let author = p
                .author_id
                .as_deref()
                .and_then(|id| users.get(id).copied())
                .unwrap_or("i");
            let created_at = DateTime::<Utc>::from_timestamp_millis(ms)
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| "-".to_string());
            NotificationItem::new(p.id.clone(), ms)
                .field("id", p.id.clone())
                .field("text", normalize_text(&p.text))
                .field("author", author)
                .field("url", format!("https://x.com/{}/status/{}", author, p.id))
                .field("created_at", created_at)
        })
        .collect();

    Ok(Page {
        items,
        next_token: rsp.meta.next_token.filter(|t| !t.is_empty()),
    })
}

/// `start_time`/`end_time` for a window, in the whole seconds the search API takes.
/// Truncated windows of consecutive cycles still tile the timeline, so a window
/// that truncates to nothing is skipped.
fn request_bounds(window: Cursor) -> Option<(String, String)> {
    let start = window.start.trunc_subsecs(0);
    let end = window.end.trunc_subsecs(0);
    (end > start).then(|| {
        (
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    })
}

pub struct SocialSearchUpstream {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: String,
    query: String,
    page_size: u32,
}

#[async_trait]
impl PageUpstream for SocialSearchUpstream {
    async fn fetch_page(&self, window: Cursor, page_token: Option<String>) -> Result<Page> {
        let Some((start_time, end_time)) = request_bounds(window) else {
            return Ok(Page::default());
        };
        let mut params: Vec<(&str, String)> = vec![
            ("query", self.query.clone()),
            ("start_time", start_time),
            ("end_time", end_time),
            ("max_results", self.page_size.to_string()),
            ("tweet.fields", "created_at,author_id".to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("next_token", token));
        }
        let req = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .query(&params);
        let body = fetch_text(req, "social search").await?;
        parse_search_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn request_bounds_truncate_to_whole_seconds() {
        let base = 1_756_728_000_000; // 2025-09-01T12:00:00Z
        let w = Cursor {
            start: at_ms(base + 400),
            end: at_ms(base + 2_700),
        };
        assert_eq!(
            request_bounds(w),
            Some(("2025-09-01T12:00:00Z".to_string(), "2025-09-01T12:00:02Z".to_string()))
        );

        let sub_second = Cursor {
            start: at_ms(base + 100),
            end: at_ms(base + 900),
        };
        assert_eq!(request_bounds(sub_second), None);
    }

    #[tokio::test]
    async fn sub_second_window_is_answered_without_a_request() {
        let upstream = SocialSearchUpstream {
            client: reqwest::Client::new(),
            // nothing listens here; any request would fail
            endpoint: "http://127.0.0.1:9/search".into(),
            bearer_token: "t".into(),
            query: "$BTC".into(),
            page_size: 10,
        };
        let base = 1_756_728_000_000;
        let w = Cursor {
            start: at_ms(base + 100),
            end: at_ms(base + 900),
        };
        let page = upstream.fetch_page(w, None).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn parses_posts_authors_and_token() {
        let body = r#"{
            "data":[
              {"id":"1901","text":"BTC  &amp; ETH up","created_at":"2025-09-01T12:00:05.000Z","author_id":"7"},
              {"id":"1902","text":"no author","created_at":"2025-09-01T12:00:06.000Z"}
            ],
            "includes":{"users":[{"id":"7","username":"alice","name":"Alice"}]},
            "meta":{"result_count":2,"next_token":"abc"}
        }"#;
        let page = parse_search_page(body).unwrap();
        assert_eq!(page.next_token.as_deref(), Some("abc"));
        assert_eq!(page.items.len(), 2);
        let first = &page.items[0];
        assert_eq!(first.dedup_key, "1901");
        assert_eq!(first.get("text"), Some("BTC & ETH up"));
        assert_eq!(first.get("author"), Some("alice"));
        assert_eq!(first.get("url"), Some("https://x.com/alice/status/1901"));
        assert_eq!(first.get("created_at"), Some("2025-09-01T12:00:05Z"));
        assert_eq!(page.items[1].get("url"), Some("https://x.com/i/status/1902"));
    }

    #[test]
    fn empty_page_has_no_data_field() {
        let page = parse_search_page(r#"{"meta":{"result_count":0}}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn missing_created_at_falls_back_to_snowflake_time() {
        // 1_500_000_000_000 ms since the snowflake epoch.
        let id = (1_500_000_000_000i64 << 22).to_string();
        let body = format!(r#"{{"data":[{{"id":"{id}","text":"x"}}]}}"#);
        let page = parse_search_page(&body).unwrap();
        assert_eq!(page.items[0].ordering_key, 1_500_000_000_000 + SNOWFLAKE_EPOCH_MS);
    }

    #[test]
    fn exclusions_extend_the_query_once() {
        let opts = SocialOptions {
            endpoint: default_endpoint(),
            bearer_token_env: "T".into(),
            query: "$BTC -is:reply".into(),
            exclude: vec![Exclude::Retweets, Exclude::Replies],
            page_size: 100,
            min_interval_ms: 1000,
            lag_secs: 10,
            lookback_secs: 10,
            max_pages: 5,
        };
        assert_eq!(opts.full_query(), "$BTC -is:reply -is:retweet");
    }
}
