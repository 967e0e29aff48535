//! Market Feed Notifier: binary entrypoint
//! Loads the feeds config, starts one supervised task per source, and serves
//! `/health` + `/metrics` through Shuttle.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use market_feed_notifier::{api, init_tracing, metrics::Metrics, Engine, FeedsConfig};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let cfg = FeedsConfig::load_default().context("loading feeds config")?;
    let engine = Engine::from_config(&cfg)?;
    let tasks = engine.start();
    tracing::info!(tasks = tasks.len(), "feed engine started");

    let router = api::create_router(metrics.as_ref());
    Ok(router.into())
}
