//! Health endpoints.
//!
//! Mounted outside the response envelope: load balancers and orchestrators
//! read the status code and the probe report directly.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::health::aggregator::{HealthAggregator, Profile};
use crate::health::report::HealthReport;

/// `{prefix}/health`, `/health/detailed`, `/health/liveness`, `/health/readiness`.
pub fn router(aggregator: Arc<HealthAggregator>, prefix: &str) -> Router {
    let base = format!("{}/health", prefix.trim_end_matches('/'));
    Router::new()
        .route(&base, get(basic))
        .route(&format!("{base}/detailed"), get(detailed))
        .route(&format!("{base}/liveness"), get(liveness))
        .route(&format!("{base}/readiness"), get(readiness))
        .with_state(aggregator)
}

async fn basic(State(aggregator): State<Arc<HealthAggregator>>) -> HealthReport {
    aggregator.check(Profile::Basic).await
}

async fn detailed(State(aggregator): State<Arc<HealthAggregator>>) -> HealthReport {
    aggregator.check(Profile::Detailed).await
}

async fn liveness(State(aggregator): State<Arc<HealthAggregator>>) -> HealthReport {
    aggregator.check(Profile::Liveness).await
}

async fn readiness(State(aggregator): State<Arc<HealthAggregator>>) -> HealthReport {
    aggregator.check(Profile::Readiness).await
}
