//! Operator probe: plan every source from the feeds config, run one seed cycle per
//! source, and print what each upstream currently reports. Nothing is delivered.

use anyhow::Result;

use market_feed_notifier::engine::{http_client, plan};
use market_feed_notifier::feed::CycleOutcome;
use market_feed_notifier::{init_tracing, FeedsConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedsConfig::load_default()?;
    let http = http_client(&cfg.http)?;
    let plan = plan(&cfg);

    for e in &plan.errors {
        println!("REJECTED  {e}");
    }

    let mut failures = 0usize;
    for src in &plan.sources {
        let mut feed = src.settings.build(&src.name, &http);
        match feed.poll().await {
            Ok(CycleOutcome::Seeded { observed }) => {
                println!("OK        {:<24} {:>5} item(s) upstream", src.name, observed)
            }
            Ok(CycleOutcome::Items(items)) => {
                println!("OK        {:<24} {:>5} item(s) (not seeded)", src.name, items.len())
            }
            Err(e) => {
                failures += 1;
                println!("FAILED    {:<24} {e:#}", src.name);
            }
        }
    }

    println!(
        "probe done: {} source(s), {} rejected, {} failed",
        plan.sources.len(),
        plan.errors.len(),
        failures
    );
    Ok(())
}
