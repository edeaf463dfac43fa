//! Prometheus metrics endpoint handler.
//!
//! The endpoint is unauthenticated. Metric labels carry no tokens or ids.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE meeting_created_total counter
/// meeting_created_total 42
/// ```
#[tracing::instrument(skip_all, name = "meeting.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
