//! Expiry sweep background task.
//!
//! Periodically deletes every meeting whose `expires_at` has passed. The
//! sweep does not apply the call grace rule: a meeting with a call is kept
//! readable past expiry only until the next sweep.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the token
//! is cancelled, the task completes its current iteration and exits cleanly.

use crate::clock::{system_clock, Clock};
use crate::observability::metrics::record_expired_swept;
use crate::repositories::MeetingStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Configuration for the expiry sweep task.
#[derive(Clone)]
pub struct ExpirySweepConfig {
    /// Sweep interval.
    pub interval: Duration,
    /// Time source for the expiry cut-off.
    pub clock: Clock,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            clock: system_clock(),
        }
    }
}

impl ExpirySweepConfig {
    /// Sweep every `interval` using the system clock.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Start the expiry sweep background task.
///
/// Runs until the cancellation token is triggered. A failed sweep is logged
/// and retried on the next tick.
#[instrument(skip_all, name = "meeting.task.expiry_sweep")]
pub async fn start_expiry_sweep(
    store: Arc<dyn MeetingStore>,
    config: ExpirySweepConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "meeting.task.expiry_sweep",
        backend = store.backend(),
        interval_seconds = config.interval.as_secs(),
        "Starting expiry sweep task"
    );

    let mut interval = tokio::time::interval(config.interval);
    // The first tick completes immediately; skip it so a fresh start does not
    // sweep before the first full interval.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(store.as_ref(), (config.clock)()).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "meeting.task.expiry_sweep",
                    "Expiry sweep task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "meeting.task.expiry_sweep", "Expiry sweep task stopped");
}

/// Run a single sweep iteration. Returns the number of deleted meetings.
pub async fn run_sweep(store: &dyn MeetingStore, now: i64) -> u64 {
    match store.delete_expired(now).await {
        Ok(count) => {
            if count > 0 {
                info!(
                    target: "meeting.task.expiry_sweep",
                    deleted = count,
                    "Deleted expired meetings"
                );
            }
            record_expired_swept(count);
            count
        }
        Err(e) => {
            warn!(
                target: "meeting.task.expiry_sweep",
                error = %e,
                "Failed to delete expired meetings"
            );
            0
        }
    }
}
