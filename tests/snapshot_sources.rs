// tests/snapshot_sources.rs
//
// Whole-state and list-diff sources driven through the scheduler with scripted
// upstreams: seeding, no-change cycles, change detection and failure handling.

mod common;

use std::time::Duration;

use chrono::NaiveDate;

use common::{RecordingTarget, ScriptedProvider};
use market_feed_notifier::feed::providers::earnings::{EarningsEntry, EarningsFeed};
use market_feed_notifier::feed::providers::gas::{GasPriceFeed, GasTiers};
use market_feed_notifier::feed::providers::trending::TrendingFeed;
use market_feed_notifier::feed::{Cadence, CycleReport, DispatchReport, FeedCycle, NotificationDispatcher, Scheduler};
use market_feed_notifier::notify::PayloadTemplate;

fn tiers(slow: f64, average: f64, fast: f64) -> GasTiers {
    GasTiers { slow, average, fast }
}

fn syms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn sent(n: usize) -> CycleReport {
    CycleReport::Dispatched(DispatchReport {
        delivered: n,
        failed: 0,
    })
}

fn scheduler(feed: Box<dyn FeedCycle>, template: &str, target: std::sync::Arc<RecordingTarget>) -> Scheduler {
    let dispatcher = NotificationDispatcher::new(feed.name().to_string(), target, PayloadTemplate::text(template));
    Scheduler::new(feed, Cadence::Interval(Duration::from_secs(30)), dispatcher)
}

#[tokio::test]
async fn gas_seeds_then_emits_only_on_change() {
    let provider = ScriptedProvider::new(vec![
        Ok(tiers(10.0, 12.0, 15.0)),
        Ok(tiers(10.0, 12.0, 15.0)),
        Ok(tiers(9.0, 11.0, 14.0)),
    ]);
    let target = RecordingTarget::new();
    let feed = GasPriceFeed::new("gas", Box::new(provider));
    let mut s = scheduler(Box::new(feed), "slow {slow} ({slow_delta}) fast {fast}", target.clone());

    assert_eq!(s.run_cycle().await, CycleReport::Seeded { observed: 1 });
    assert_eq!(s.run_cycle().await, sent(0));
    assert_eq!(s.run_cycle().await, sent(1));
    assert_eq!(target.texts(), vec!["slow 9 (-1) fast 14"]);
}

#[tokio::test]
async fn gas_failure_keeps_previous_snapshot() {
    let provider = ScriptedProvider::new(vec![
        Ok(tiers(10.0, 12.0, 15.0)),
        Err("timeout".to_string()),
        Ok(tiers(10.0, 12.0, 15.0)),
    ]);
    let mut feed = GasPriceFeed::new("gas", Box::new(provider));
    feed.poll().await.unwrap();
    assert!(feed.poll().await.is_err());
    assert_eq!(feed.snapshot(), Some(&tiers(10.0, 12.0, 15.0)));
    assert!(feed.poll().await.unwrap().items().is_empty());
}

#[tokio::test]
async fn trending_emits_full_new_list_once() {
    let provider = ScriptedProvider::new(vec![
        Ok(syms(&["AAA", "BBB", "CCC"])),
        Ok(syms(&["AAA", "BBB", "CCC"])),
        Ok(syms(&["BBB", "CCC", "DDD"])),
    ]);
    let target = RecordingTarget::new();
    let mut s = scheduler(
        Box::new(TrendingFeed::new("trending", Box::new(provider))),
        "{symbols} | +{added} -{removed}",
        target.clone(),
    );

    assert_eq!(s.run_cycle().await, CycleReport::Seeded { observed: 3 });
    assert_eq!(s.run_cycle().await, sent(0));
    assert_eq!(s.run_cycle().await, sent(1));
    assert_eq!(target.texts(), vec!["BBB, CCC, DDD | +DDD -AAA"]);
}

#[tokio::test]
async fn trending_rank_change_counts_as_change() {
    let provider = ScriptedProvider::new(vec![Ok(syms(&["AAA", "BBB"])), Ok(syms(&["BBB", "AAA"]))]);
    let mut feed = TrendingFeed::new("trending", Box::new(provider));
    feed.poll().await.unwrap();
    let out = feed.poll().await.unwrap();
    assert_eq!(out.items().len(), 1);
    assert_eq!(out.items()[0].get("added"), Some("-"));
}

fn entry(symbol: &str, day: u32, eps_actual: &str) -> EarningsEntry {
    EarningsEntry {
        symbol: symbol.to_string(),
        date: NaiveDate::from_ymd_opt(2025, 10, day).unwrap(),
        hour: "after close".to_string(),
        eps_estimate: "1.20".to_string(),
        eps_actual: eps_actual.to_string(),
        revenue_estimate: "2.50B".to_string(),
        revenue_actual: "-".to_string(),
    }
}

#[tokio::test]
async fn earnings_emits_new_and_updated_entries() {
    let provider = ScriptedProvider::new(vec![
        Ok(vec![entry("AAA", 21, "-"), entry("BBB", 22, "-")]),
        Ok(vec![entry("AAA", 21, "1.31"), entry("BBB", 22, "-"), entry("CCC", 23, "-")]),
    ]);
    let target = RecordingTarget::new();
    let mut s = scheduler(
        Box::new(EarningsFeed::new("earnings", Box::new(provider))),
        "{symbol} {status} {eps_actual}",
        target.clone(),
    );

    assert_eq!(s.run_cycle().await, CycleReport::Seeded { observed: 2 });
    assert_eq!(s.run_cycle().await, sent(2));
    assert_eq!(target.texts(), vec!["AAA reported 1.31", "CCC upcoming -"]);
}

#[tokio::test]
async fn failing_source_does_not_affect_another() {
    let broken = ScriptedProvider::<GasTiers>::new(vec![Err("dns".into()), Err("dns".into())]);
    let healthy = ScriptedProvider::new(vec![Ok(tiers(1.0, 2.0, 3.0)), Ok(tiers(1.0, 2.0, 4.0))]);
    let target = RecordingTarget::new();
    let mut a = scheduler(Box::new(GasPriceFeed::new("a", Box::new(broken))), "{fast}", target.clone());
    let mut b = scheduler(Box::new(GasPriceFeed::new("b", Box::new(healthy))), "{fast}", target.clone());

    for _ in 0..2 {
        assert_eq!(a.run_cycle().await, CycleReport::Failed);
    }
    assert_eq!(b.run_cycle().await, CycleReport::Seeded { observed: 1 });
    assert_eq!(b.run_cycle().await, sent(1));
    assert_eq!(target.texts(), vec!["4"]);
}

#[tokio::test(start_paused = true)]
async fn interval_cadence_runs_until_aborted() {
    let provider = ScriptedProvider::new(vec![
        Ok(tiers(10.0, 12.0, 15.0)),
        Err("502".to_string()),
        Ok(tiers(9.0, 11.0, 14.0)),
        Ok(tiers(9.0, 11.0, 14.0)),
    ]);
    let target = RecordingTarget::new();
    let s = scheduler(Box::new(GasPriceFeed::new("gas", Box::new(provider))), "{average}", target.clone());
    let handle = tokio::spawn(s.run());

    // ticks at 0s, 30s, 60s, 90s
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert!(!handle.is_finished());
    handle.abort();

    assert_eq!(target.texts(), vec!["11"]);
}
