//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Health check handler.
///
/// Probes the meeting store and reports the active backend. An unreachable
/// store yields `"unhealthy"` with a 200 so probes can read the body.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "backend": "postgres",
///   "store": "healthy"
/// }
/// ```
#[instrument(skip_all, name = "meeting.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = state.service.store();

    let healthy = match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(target: "meeting.handlers.health", error = %e, "Store probe failed");
            false
        }
    };
    let status = if healthy { "healthy" } else { "unhealthy" };

    Json(HealthResponse {
        status: status.to_string(),
        backend: store.backend().to_string(),
        store: Some(status.to_string()),
    })
}
