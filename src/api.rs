use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;

/// `/health` always; `/metrics` only when a recorder is installed.
pub fn create_router(metrics: Option<&Metrics>) -> Router {
    let mut router = Router::new().route("/health", get(|| async { "ok" }));
    if let Some(m) = metrics {
        router = router.merge(m.router());
    }
    router.layer(CorsLayer::very_permissive())
}
