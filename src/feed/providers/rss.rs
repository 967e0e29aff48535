// src/feed/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use super::fetch_text;
use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::normalize_text;
use crate::feed::seed::{DedupSeedGuard, SeenSet};
use crate::feed::types::{sort_chronologically, CycleOutcome, FeedCycle, NotificationItem, SourceProvider};

pub const DEFAULT_INTERVAL_SECS: u64 = 300;
const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RssOptions {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RssSettings {
    pub options: RssOptions,
}

impl RssSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let options: RssOptions = cfg.options_as()?;
        let url = options.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::options(&cfg.name, "`url` must be an http(s) URL"));
        }
        Ok(Self { options })
    }

    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        let provider = RssProvider::from_url(self.options.url.trim().to_string(), http.clone());
        Box::new(RssFeed::new(name, Box::new(provider)))
    }
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Format-neutral entry, in document order.
struct RawEntry {
    title: String,
    link: Option<String>,
    published: Option<OffsetDateTime>,
    summary: String,
}

fn parse_rfc2822(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()
}

fn parse_rfc3339(ts: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339).ok()
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn parse_entries(xml: &str) -> Result<Vec<RawEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    match from_str::<Rss>(&xml_clean) {
        Ok(rss) => Ok(rss
            .channel
            .item
            .into_iter()
            .map(|it| RawEntry {
                title: it.title.unwrap_or_default(),
                link: it.link,
                published: it.pub_date.as_deref().and_then(parse_rfc2822),
                summary: it.description.unwrap_or_default(),
            })
            .collect()),
        Err(rss_err) => {
            // Any root deserializes into an empty AtomFeed, so require the element.
            if !xml_clean.contains("<feed") {
                return Err(rss_err).context("parsing rss xml");
            }
            let atom: AtomFeed = from_str(&xml_clean)
                .map_err(|_| rss_err)
                .context("parsing rss/atom xml")?;
            Ok(atom
                .entry
                .into_iter()
                .map(|e| {
                    let link = e
                        .link
                        .iter()
                        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                        .or_else(|| e.link.first())
                        .and_then(|l| l.href.clone());
                    RawEntry {
                        title: e.title.map(|t| t.value).unwrap_or_default(),
                        link,
                        published: e
                            .published
                            .as_deref()
                            .or(e.updated.as_deref())
                            .and_then(parse_rfc3339),
                        summary: e.summary.map(|t| t.value).unwrap_or_default(),
                    }
                })
                .collect())
        }
    }
}

/// Canonical form of an item link used as its dedup key: no fragment, no `utm_*`
/// params, no trailing slash, lower-cased scheme and host.
pub fn clean_link(raw: &str) -> String {
    let s = raw.trim();
    let s = s.split('#').next().unwrap_or_default();
    let (base, query) = match s.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (s, None),
    };
    let kept: Vec<&str> = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter(|p| !p.is_empty() && !p.to_ascii_lowercase().starts_with("utm_"))
        .collect();

    let base = match base.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(i) => rest.split_at(i),
                None => (rest, ""),
            };
            format!("{}://{}{}", scheme.to_ascii_lowercase(), host.to_ascii_lowercase(), path)
        }
        None => base.to_string(),
    };
    let base = base.trim_end_matches('/');

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

/// Parse a feed document into items, oldest first.
///
/// Feeds list newest first, so undated entries take the ordering key of the
/// next-older neighbour, which keeps them in reverse document order.
pub fn parse_feed(xml: &str) -> Result<Vec<NotificationItem>> {
    let entries = parse_entries(xml)?;
    let mut out = Vec::with_capacity(entries.len());
    let mut last_key = 0i64;

    for e in entries.into_iter().rev() {
        let title = normalize_text(&e.title);
        let link = e.link.as_deref().map(str::trim).filter(|l| !l.is_empty());
        let dedup_key = match link {
            Some(l) => clean_link(l),
            None if !title.is_empty() => format!("title:{}", title.to_lowercase()),
            None => continue,
        };

        let ordering_key = match e.published {
            Some(ts) => {
                let ms = (ts.unix_timestamp_nanos() / 1_000_000) as i64;
                last_key = ms;
                ms
            }
            None => last_key,
        };
        let published = e
            .published
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .unwrap_or_else(|| "-".to_string());

        out.push(
            NotificationItem::new(dedup_key, ordering_key)
                .field("title", if title.is_empty() { "(untitled)".to_string() } else { title })
                .field("link", link.unwrap_or("-"))
                .field("summary", truncate_chars(&normalize_text(&e.summary), SUMMARY_MAX_CHARS))
                .field("published", published),
        );
    }

    sort_chronologically(&mut out);
    Ok(out)
}

pub struct RssProvider {
    mode: Mode,
}

enum Mode {
    // Owned copy so tests need no 'static input.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: String, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { url, client },
        }
    }
}

#[async_trait]
impl SourceProvider<Vec<NotificationItem>> for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<NotificationItem>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(s),
            Mode::Http { url, client } => {
                let body = fetch_text(client.get(url), "rss").await?;
                parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

/// Seen-set source: emits entries whose cleaned link was never observed.
pub struct RssFeed {
    name: String,
    provider: Box<dyn SourceProvider<Vec<NotificationItem>>>,
    seen: SeenSet,
    guard: DedupSeedGuard,
}

impl RssFeed {
    pub fn new(name: impl Into<String>, provider: Box<dyn SourceProvider<Vec<NotificationItem>>>) -> Self {
        Self {
            name: name.into(),
            provider,
            seen: SeenSet::new(),
            guard: DedupSeedGuard::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }
}

#[async_trait]
impl FeedCycle for RssFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        let items = self.provider.fetch_latest().await?;
        if self.guard.seed_if_first() {
            self.seen.seed(items.iter().map(|it| it.dedup_key.as_str()));
            return Ok(CycleOutcome::Seeded {
                observed: items.len(),
            });
        }
        let mut fresh = self.seen.retain_unseen(items);
        sort_chronologically(&mut fresh);
        Ok(CycleOutcome::Items(fresh))
    }
}
