// src/feed/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use metrics::{counter, gauge, histogram};
use tokio::time::MissedTickBehavior;

use crate::feed::dispatcher::{DispatchReport, NotificationDispatcher};
use crate::feed::ensure_metrics_described;
use crate::feed::types::{CycleOutcome, FeedCycle};

/// When a source's cycles run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed period; a slow cycle delays the next tick instead of overlapping it.
    Interval(Duration),
    /// Next cycle starts as soon as the previous one finishes, success or failure.
    Continuous,
    /// Wall-clock UTC times, skipping some weekdays.
    Daily(DailyRule),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRule {
    times: Vec<NaiveTime>,
    skip_days: Vec<Weekday>,
}

impl DailyRule {
    /// `times` as `"HH:MM"`, `skip_days` as weekday names (`"Sat"`, `"sunday"`, ...).
    pub fn parse<S: AsRef<str>>(times: &[S], skip_days: &[S]) -> Result<Self, String> {
        let mut parsed = Vec::with_capacity(times.len());
        for t in times {
            let t = t.as_ref().trim();
            let nt = NaiveTime::parse_from_str(t, "%H:%M").map_err(|e| format!("bad time {t:?}: {e}"))?;
            parsed.push(nt);
        }
        if parsed.is_empty() {
            return Err("at least one time is required".into());
        }
        parsed.sort();
        parsed.dedup();

        let mut skip = Vec::with_capacity(skip_days.len());
        for d in skip_days {
            let d = d.as_ref().trim();
            let wd: Weekday = d.parse().map_err(|_| format!("bad weekday {d:?}"))?;
            if !skip.contains(&wd) {
                skip.push(wd);
            }
        }
        if skip.len() >= 7 {
            return Err("every weekday is skipped".into());
        }

        Ok(Self {
            times: parsed,
            skip_days: skip,
        })
    }

    pub fn is_skipped(&self, day: Weekday) -> bool {
        self.skip_days.contains(&day)
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        (0..=7i64)
            .filter_map(|offset| today.checked_add_signed(ChronoDuration::days(offset)))
            .filter(|date| !self.is_skipped(date.weekday()))
            .flat_map(|date| self.times.iter().map(move |t| date.and_time(*t).and_utc()))
            .find(|at| *at > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    Seeded { observed: usize },
    Dispatched(DispatchReport),
    Failed,
}

/// Wall-clock source for daily cadences.
pub type WallClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Drives one source. Owns the source's state exclusively, so cycles never overlap.
pub struct Scheduler {
    feed: Box<dyn FeedCycle>,
    cadence: Cadence,
    dispatcher: NotificationDispatcher,
    clock: WallClock,
    cycles: u64,
}

impl Scheduler {
    pub fn new(feed: Box<dyn FeedCycle>, cadence: Cadence, dispatcher: NotificationDispatcher) -> Self {
        ensure_metrics_described();
        Self {
            feed,
            cadence,
            dispatcher,
            clock: Arc::new(Utc::now),
            cycles: 0,
        }
    }

    pub fn with_clock(mut self, clock: WallClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        self.feed.name()
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// One fetch → diff → deliver pass. Never fails; failures become log entries.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let cycle = self.cycles;
        let source = self.feed.name().to_string();
        tracing::debug!(target: "feed", source = %source, cycle, "cycle start");

        let t0 = std::time::Instant::now();
        let outcome = self.feed.poll().await;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_cycle_ms", "source" => source.clone()).record(ms);

        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                counter!("feed_cycles_total", "source" => source.clone(), "outcome" => "error").increment(1);
                tracing::warn!(
                    target: "feed",
                    source = %source,
                    cycle,
                    error = %format!("{e:#}"),
                    "cycle failed; state unchanged"
                );
                return CycleReport::Failed;
            }
        };

        counter!("feed_cycles_total", "source" => source.clone(), "outcome" => "ok").increment(1);
        gauge!("feed_last_success_ts", "source" => source.clone()).set(Utc::now().timestamp() as f64);

        match outcome {
            CycleOutcome::Seeded { observed } => {
                counter!("feed_seeded_total", "source" => source.clone()).increment(1);
                tracing::info!(target: "feed", source = %source, cycle, observed, "seed-only cycle; nothing emitted");
                CycleReport::Seeded { observed }
            }
            CycleOutcome::Items(items) => {
                counter!("feed_items_emitted_total", "source" => source.clone()).increment(items.len() as u64);
                if items.is_empty() {
                    tracing::debug!(target: "feed", source = %source, cycle, "no new items");
                } else {
                    tracing::info!(target: "feed", source = %source, cycle, items = items.len(), "new items");
                }
                let report = self.dispatcher.deliver_all(&items).await;
                CycleReport::Dispatched(report)
            }
        }
    }

    /// Run forever according to the cadence. Returns only if a daily rule has no
    /// future firing, which validation rules out.
    pub async fn run(mut self) {
        match self.cadence.clone() {
            Cadence::Continuous => loop {
                self.run_cycle().await;
                tokio::task::yield_now().await;
            },
            Cadence::Interval(period) => {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    self.run_cycle().await;
                }
            }
            Cadence::Daily(rule) => {
                let mut last_fired: Option<DateTime<Utc>> = None;
                loop {
                    let now = (self.clock)();
                    // The timer and the wall clock can disagree; a served slot is never served again.
                    let from = last_fired.map_or(now, |prev| now.max(prev));
                    let Some(next) = rule.next_after(from) else {
                        tracing::error!(target: "feed", source = %self.name(), "daily rule has no future firing");
                        return;
                    };
                    tracing::debug!(target: "feed", source = %self.name(), next = %next, "next scheduled post");
                    let wait = (next - now).to_std().unwrap_or_default();
                    tokio::time::sleep(wait).await;
                    self.run_cycle().await;
                    last_fired = Some(next);
                }
            }
        }
    }
}
