// tests/supervision.rs
//
// Restart after a panicking cycle, and the daily cadence driven on a paused clock.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use common::{post, RecordingTarget};
use market_feed_notifier::engine::supervise_with;
use market_feed_notifier::feed::providers::scheduled::ScheduledPost;
use market_feed_notifier::feed::{
    Cadence, CycleOutcome, DailyRule, DedupSeedGuard, FeedCycle, NotificationDispatcher, Scheduler, WallClock,
};
use market_feed_notifier::notify::PayloadTemplate;

/// Seeds on its first poll; the first build panics on its second poll.
struct Flaky {
    build: usize,
    polls: usize,
    guard: DedupSeedGuard,
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FeedCycle for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn poll(&mut self) -> Result<CycleOutcome> {
        self.polls += 1;
        if self.build == 1 && self.polls == 2 {
            self.events.lock().push(format!("b{}:panic", self.build));
            panic!("upstream returned something impossible");
        }
        if self.guard.seed_if_first() {
            self.events.lock().push(format!("b{}:seed", self.build));
            return Ok(CycleOutcome::Seeded { observed: 1 });
        }
        self.events.lock().push(format!("b{}:items", self.build));
        Ok(CycleOutcome::Items(vec![post(self.polls as u64, 0)]))
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_source_is_rebuilt_and_seeds_again() {
    let target = RecordingTarget::new();
    let dispatcher = NotificationDispatcher::new("flaky", target.clone(), PayloadTemplate::text("{id}"));
    let events = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicUsize::new(0));

    let task = {
        let events = events.clone();
        let builds = builds.clone();
        tokio::spawn(async move {
            supervise_with(
                "flaky",
                &Cadence::Interval(Duration::from_secs(10)),
                &dispatcher,
                Duration::from_secs(5),
                move || -> Box<dyn FeedCycle> {
                    let build = builds.fetch_add(1, Ordering::SeqCst) + 1;
                    Box::new(Flaky {
                        build,
                        polls: 0,
                        guard: DedupSeedGuard::new(),
                        events: events.clone(),
                    })
                },
            )
            .await
        })
    };

    // t=0 seed, t=10 panic, t=15 rebuild + seed, t=25 first delivery
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(18)).await;
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(
        *events.lock(),
        vec!["b1:seed", "b1:panic", "b2:seed", "b2:items"]
    );
    assert_eq!(target.texts(), vec!["2"]);

    assert!(!task.is_finished());
    task.abort();
}

/// Wall clock anchored at `anchor` that advances with tokio's (paused) clock at `rate`.
fn virtual_clock(anchor: DateTime<Utc>, rate: f64) -> WallClock {
    let start = tokio::time::Instant::now();
    Arc::new(move || {
        let elapsed = start.elapsed().mul_f64(rate);
        anchor + chrono::Duration::from_std(elapsed).unwrap()
    })
}

fn bell_scheduler(target: Arc<RecordingTarget>, clock: WallClock) -> Scheduler {
    let rule = DailyRule::parse(&["09:00", "13:30"], &["Sat", "Sun"]).unwrap();
    let dispatcher = NotificationDispatcher::new("bell", target, PayloadTemplate::text("{time}"));
    Scheduler::new(
        Box::new(ScheduledPost::new("bell", BTreeMap::new())),
        Cadence::Daily(rule),
        dispatcher,
    )
    .with_clock(clock)
}

#[tokio::test(start_paused = true)]
async fn daily_cadence_posts_once_per_slot_across_a_weekend() {
    let target = RecordingTarget::new();
    // Friday 2025-09-05 10:00 UTC
    let anchor = Utc.with_ymd_and_hms(2025, 9, 5, 10, 0, 0).unwrap();
    let task = tokio::spawn(bell_scheduler(target.clone(), virtual_clock(anchor, 1.0)).run());

    // Fri 13:30 fires after 3.5h
    tokio::time::sleep(Duration::from_secs(4 * 3600)).await;
    assert_eq!(target.count(), 1);

    // through Tue 08:00: Mon 09:00 and Mon 13:30, nothing on the weekend
    tokio::time::sleep(Duration::from_secs(90 * 3600)).await;
    assert_eq!(target.count(), 3);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn lagging_wall_clock_never_repeats_a_slot() {
    let target = RecordingTarget::new();
    let anchor = Utc.with_ymd_and_hms(2025, 9, 5, 10, 0, 0).unwrap();
    // Wall clock runs 1% behind the timer, so every wake-up lands just before its slot.
    let task = tokio::spawn(bell_scheduler(target.clone(), virtual_clock(anchor, 0.99)).run());

    tokio::time::sleep(Duration::from_secs(4 * 3600)).await;
    assert_eq!(target.count(), 1);

    tokio::time::sleep(Duration::from_secs(76 * 3600)).await;
    assert_eq!(target.count(), 3);

    task.abort();
}
