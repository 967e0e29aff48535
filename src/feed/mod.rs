// src/feed/mod.rs
pub mod differ;
pub mod dispatcher;
pub mod paginator;
pub mod providers;
pub mod rate_limit;
pub mod scheduler;
pub mod seed;
pub mod types;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use paginator::{Cursor, CursorFeed, CursorPaginator, Page, PageUpstream};
pub use rate_limit::RateLimitedQueue;
pub use scheduler::{Cadence, CycleReport, DailyRule, Scheduler, WallClock};
pub use seed::{DedupSeedGuard, SeenSet};
pub use types::{CycleOutcome, FeedCycle, NotificationItem, SourceProvider};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_cycles_total", "Fetch cycles by source and outcome.");
        describe_counter!(
            "feed_items_emitted_total",
            "New items handed to the dispatcher."
        );
        describe_counter!(
            "feed_seeded_total",
            "Seed-only cycles (baseline recorded, nothing emitted)."
        );
        describe_counter!(
            "feed_deliveries_total",
            "Delivery attempts by source and outcome."
        );
        describe_histogram!("feed_cycle_ms", "Fetch + diff time in milliseconds.");
        describe_gauge!(
            "feed_last_success_ts",
            "Unix ts of the last successful cycle."
        );
    });
}

/// Short, stable digest of a dedup key for log lines (links and post ids can be long).
pub fn key_digest(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_decodes_strips_and_collapses() {
        let s = "  <p>Rates&nbsp;&nbsp; <b>cut</b></p> \u{201C}soon\u{201D}!  ";
        assert_eq!(normalize_text(s), "Rates cut \"soon\"!");
    }

    #[test]
    fn key_digest_is_short_and_stable() {
        let a = key_digest("https://example.com/a");
        assert_eq!(a.len(), 12);
        assert_eq!(a, key_digest("https://example.com/a"));
        assert_ne!(a, key_digest("https://example.com/b"));
    }
}
