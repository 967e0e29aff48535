// src/feed/providers/earnings.rs
//! Earnings calendar. Entries are compared on their fully formatted field set, so a
//! row whose actuals get filled in counts as a new entry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;

use super::{fetch_text, source_secret};
use crate::config::feeds::SourceConfig;
use crate::error::ConfigError;
use crate::feed::differ::{ListObservation, ListState};
use crate::feed::types::{sort_chronologically, CycleOutcome, FeedCycle, NotificationItem, SourceProvider};

pub const DEFAULT_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_EARNINGS_ENDPOINT: &str = "https://finnhub.io/api/v1/calendar/earnings";

fn default_endpoint() -> String {
    DEFAULT_EARNINGS_ENDPOINT.to_string()
}
fn default_window_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EarningsOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key_env: String,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Only these symbols; empty means all.
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EarningsSettings {
    pub options: EarningsOptions,
    pub api_key: String,
}

impl EarningsSettings {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
        let mut options: EarningsOptions = cfg.options_as()?;
        if !(0..=90).contains(&options.window_days) {
            return Err(ConfigError::options(&cfg.name, "`window_days` must be within 0..=90"));
        }
        if options.limit == Some(0) {
            return Err(ConfigError::options(&cfg.name, "`limit` must be > 0"));
        }
        options.watchlist = options
            .watchlist
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        let api_key = source_secret(&cfg.name, &options.api_key_env)?;
        Ok(Self { options, api_key })
    }

    pub fn build(&self, name: &str, http: &reqwest::Client) -> Box<dyn FeedCycle> {
        let provider = EarningsProvider {
            client: http.clone(),
            options: self.options.clone(),
            api_key: self.api_key.clone(),
        };
        Box::new(EarningsFeed::new(name, Box::new(provider)))
    }
}

/// One calendar row after formatting. Equality covers every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EarningsEntry {
    pub symbol: String,
    pub date: NaiveDate,
    pub hour: String,
    pub eps_estimate: String,
    pub eps_actual: String,
    pub revenue_estimate: String,
    pub revenue_actual: String,
}

impl EarningsEntry {
    pub fn is_reported(&self) -> bool {
        self.eps_actual != "-" || self.revenue_actual != "-"
    }

    pub fn to_item(&self) -> NotificationItem {
        let ordering = self
            .date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        let key = format!(
            "{}|{}|{}|{}|{}",
            self.symbol, self.date, self.eps_actual, self.revenue_actual, self.eps_estimate
        );
        NotificationItem::new(key, ordering)
            .field("symbol", self.symbol.clone())
            .field("date", self.date.format("%Y-%m-%d").to_string())
            .field("hour", self.hour.clone())
            .field("eps_estimate", self.eps_estimate.clone())
            .field("eps_actual", self.eps_actual.clone())
            .field("revenue_estimate", self.revenue_estimate.clone())
            .field("revenue_actual", self.revenue_actual.clone())
            .field("status", if self.is_reported() { "reported" } else { "upcoming" })
    }
}

pub fn format_eps(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.2}"),
        _ => "-".to_string(),
    }
}

pub fn format_revenue(v: Option<f64>) -> String {
    let Some(x) = v.filter(|x| x.is_finite()) else {
        return "-".to_string();
    };
    let abs = x.abs();
    if abs >= 1e9 {
        format!("{:.2}B", x / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", x / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", x / 1e3)
    } else {
        format!("{x:.0}")
    }
}

fn format_hour(h: Option<&str>) -> String {
    match h.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("bmo") => "before open".to_string(),
        Some("amc") => "after close".to_string(),
        Some("dmh") => "during market hours".to_string(),
        _ => "-".to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarResponse {
    #[serde(default)]
    earnings_calendar: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    symbol: String,
    date: String,
    #[serde(default)]
    hour: Option<String>,
    #[serde(default)]
    eps_estimate: Option<f64>,
    #[serde(default)]
    eps_actual: Option<f64>,
    #[serde(default)]
    revenue_estimate: Option<f64>,
    #[serde(default)]
    revenue_actual: Option<f64>,
}

/// Parse, filter by watchlist, sort by (date, symbol), and truncate to `limit`.
pub fn parse_calendar(body: &str, watchlist: &[String], limit: Option<usize>) -> Result<Vec<EarningsEntry>> {
    let rsp: CalendarResponse = serde_json::from_str(body).context("parsing earnings calendar json")?;
    let mut out = Vec::with_capacity(rsp.earnings_calendar.len());
    for raw in rsp.earnings_calendar {
        let symbol = raw.symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() || (!watchlist.is_empty() && !watchlist.contains(&symbol)) {
            continue;
        }
        let date = match NaiveDate::parse_from_str(raw.date.trim(), "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(target: "feed", symbol = %symbol, date = %raw.date, error = %e, "skipping earnings row with bad date");
                continue;
            }
        };
        out.push(EarningsEntry {
            symbol,
            date,
            hour: format_hour(raw.hour.as_deref()),
            eps_estimate: format_eps(raw.eps_estimate),
            eps_actual: format_eps(raw.eps_actual),
            revenue_estimate: format_revenue(raw.revenue_estimate),
            revenue_actual: format_revenue(raw.revenue_actual),
        });
    }
    out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));
    if let Some(n) = limit {
        out.truncate(n);
    }
    Ok(out)
}

pub struct EarningsProvider {
    client: reqwest::Client,
    options: EarningsOptions,
    api_key: String,
}

#[async_trait]
impl SourceProvider<Vec<EarningsEntry>> for EarningsProvider {
    async fn fetch_latest(&self) -> Result<Vec<EarningsEntry>> {
        let from = Utc::now().date_naive();
        let to = from + ChronoDuration::days(self.options.window_days);
        let params = [
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
            ("token", self.api_key.clone()),
        ];
        let body = fetch_text(self.client.get(&self.options.endpoint).query(&params), "earnings calendar").await?;
        parse_calendar(&body, &self.options.watchlist, self.options.limit)
    }

    fn name(&self) -> &'static str {
        "earnings"
    }
}

/// List-diff source: one notification per calendar row that is new or changed.
pub struct EarningsFeed {
    name: String,
    provider: Box<dyn SourceProvider<Vec<EarningsEntry>>>,
    state: ListState<EarningsEntry>,
}

impl EarningsFeed {
    pub fn new(name: impl Into<String>, provider: Box<dyn SourceProvider<Vec<EarningsEntry>>>) -> Self {
        Self {
            name: name.into(),
            provider,
            state: ListState::new(),
        }
    }

    pub fn snapshot(&self) -> &[EarningsEntry] {
        self.state.current()
    }
}

#[async_trait]
impl FeedCycle for EarningsFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        let fresh = self.provider.fetch_latest().await?;
        match self.state.observe(fresh) {
            ListObservation::Seeded { observed } => Ok(CycleOutcome::Seeded { observed }),
            ListObservation::Added(entries) => {
                let mut items: Vec<NotificationItem> = entries.iter().map(EarningsEntry::to_item).collect();
                sort_chronologically(&mut items);
                Ok(CycleOutcome::Items(items))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"earningsCalendar":[
        {"date":"2025-10-22","epsActual":null,"epsEstimate":1.234,"hour":"amc","quarter":3,"revenueActual":null,"revenueEstimate":2500000000,"symbol":"bbb","year":2025},
        {"date":"2025-10-21","epsActual":1.3,"epsEstimate":1.2,"hour":"bmo","quarter":3,"revenueActual":980000000,"revenueEstimate":950000000,"symbol":"AAA","year":2025},
        {"date":"not-a-date","symbol":"ZZZ"},
        {"date":"2025-10-21","symbol":"XYZ"}
    ]}"#;

    #[test]
    fn parses_formats_and_sorts() {
        let v = parse_calendar(BODY, &[], None).unwrap();
        let syms: Vec<_> = v.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(syms, vec!["AAA", "XYZ", "BBB"]);
        assert_eq!(v[0].hour, "before open");
        assert_eq!(v[0].eps_actual, "1.30");
        assert_eq!(v[0].revenue_actual, "980.00M");
        assert!(v[0].is_reported());
        assert_eq!(v[2].eps_estimate, "1.23");
        assert_eq!(v[2].revenue_estimate, "2.50B");
        assert_eq!(v[2].eps_actual, "-");
        assert!(!v[1].is_reported());
    }

    #[test]
    fn watchlist_and_limit() {
        let wl = vec!["BBB".to_string(), "XYZ".to_string()];
        let v = parse_calendar(BODY, &wl, Some(1)).unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].symbol, "XYZ");
    }

    #[test]
    fn revenue_compaction() {
        assert_eq!(format_revenue(Some(1_234.0)), "1.23K");
        assert_eq!(format_revenue(Some(999.0)), "999");
        assert_eq!(format_revenue(None), "-");
    }
}
