//! Metrics definitions for the meeting service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `meeting_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `reason`: 2 values (malformed, invalid)
//! - `outcome`: bounded by [`CallEventOutcome`]
//! - `status`: 3 values (success, not_allowed, error)
//! - `backend`: 2 values (postgres, memory)
//! - `operation`: bounded by the store trait methods
//! - `endpoint`: normalized route templates
//!
//! Tokens, meeting ids and call ids are never used as label values; request
//! paths carrying a token are collapsed to their route template.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("meeting_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Store buckets: memory operations land in the first bucket, database
        // round trips in the middle
        .set_buckets_for_metric(
            Matcher::Prefix("meeting_store_operation".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store operation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record an HTTP request.
///
/// Metrics: `meeting_http_request_duration_seconds`, `meeting_http_requests_total`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("meeting_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("meeting_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto its route template.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/v1/meetings" => "/v1/meetings",
        "/v1/health" => "/v1/health",
        "/metrics" => "/metrics",
        _ => {
            let Some(rest) = path.strip_prefix("/v1/meetings/") else {
                return "/other";
            };
            match rest.split_once('/') {
                None if !rest.is_empty() => "/v1/meetings/{token}",
                Some((token, "satisfaction")) if !token.is_empty() => {
                    "/v1/meetings/{token}/satisfaction"
                }
                _ => "/other",
            }
        }
    }
}

// ============================================================================
// Lifecycle Metrics
// ============================================================================

/// Record a successfully persisted meeting.
///
/// Metric: `meeting_created_total`
pub fn record_meeting_created() {
    counter!("meeting_created_total").increment(1);
}

/// Reason a presented token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Bad base64 or too short to carry a nonce.
    Malformed,
    /// Failed authentication.
    Invalid,
}

impl TokenRejection {
    /// Label value for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Malformed => "malformed",
            TokenRejection::Invalid => "invalid",
        }
    }
}

/// Record a rejected token.
///
/// Metric: `meeting_token_rejections_total`
/// Labels: `reason`
///
/// This is the only place the malformed/invalid distinction is visible
/// outside of logs.
pub fn record_token_rejection(reason: TokenRejection) {
    counter!("meeting_token_rejections_total", "reason" => reason.as_str()).increment(1);
}

/// Record a satisfaction submission.
///
/// Metric: `meeting_satisfaction_total`
/// Labels: `status` (success, not_allowed, error)
pub fn record_satisfaction(status: &'static str) {
    counter!("meeting_satisfaction_total", "status" => status).increment(1);
}

// ============================================================================
// Background Task Metrics
// ============================================================================

/// Outcome of processing one call-completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEventOutcome {
    /// Call attached to the meeting.
    Linked,
    /// Meeting already had a call; nothing changed.
    AlreadyLinked,
    /// Event carried no meeting reference.
    Skipped,
    /// Payload could not be parsed.
    Unparseable,
    /// Lifecycle update failed.
    Failed,
}

impl CallEventOutcome {
    /// Label value for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEventOutcome::Linked => "linked",
            CallEventOutcome::AlreadyLinked => "already_linked",
            CallEventOutcome::Skipped => "skipped",
            CallEventOutcome::Unparseable => "unparseable",
            CallEventOutcome::Failed => "failed",
        }
    }
}

/// Record a processed call-completion event.
///
/// Metric: `meeting_call_events_total`
/// Labels: `outcome`
pub fn record_call_event(outcome: CallEventOutcome) {
    counter!("meeting_call_events_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record meetings removed by the expiry sweep.
///
/// Metric: `meeting_expired_swept_total`
pub fn record_expired_swept(count: u64) {
    counter!("meeting_expired_swept_total").increment(count);
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a store operation.
///
/// Metric: `meeting_store_operation_duration_seconds`
/// Labels: `backend`, `operation`, `status`
pub fn record_store_operation(
    backend: &'static str,
    operation: &'static str,
    success: bool,
    duration: Duration,
) {
    let status = if success { "success" } else { "error" };
    histogram!(
        "meeting_store_operation_duration_seconds",
        "backend" => backend,
        "operation" => operation,
        "status" => status,
    )
    .record(duration.as_secs_f64());
}
