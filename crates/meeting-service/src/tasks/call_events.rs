//! Call-completion event consumer.
//!
//! Reads raw hangup payloads published by the call engine and attaches each
//! finished call to the meeting it references. The broker client that feeds
//! the channel lives outside this crate; delivery is at-least-once, so
//! handling must stay idempotent.
//!
//! # Graceful Shutdown
//!
//! The consumer exits when the cancellation token is triggered or when every
//! sender has been dropped.

use crate::models::CallHangupEvent;
use crate::observability::metrics::{record_call_event, CallEventOutcome};
use crate::services::{CallLink, MeetingService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel capacity between the broker client and the consumer.
pub const CALL_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Start the call-completion event consumer.
#[instrument(skip_all, name = "meeting.task.call_events")]
pub async fn start_call_event_consumer(
    service: Arc<MeetingService>,
    mut events: mpsc::Receiver<Vec<u8>>,
    cancel_token: CancellationToken,
) {
    info!(target: "meeting.task.call_events", "Starting call event consumer");

    loop {
        tokio::select! {
            payload = events.recv() => {
                match payload {
                    Some(payload) => {
                        handle_call_event(&service, &payload).await;
                    }
                    None => {
                        info!(
                            target: "meeting.task.call_events",
                            "Call event channel closed, exiting"
                        );
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "meeting.task.call_events",
                    "Call event consumer received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "meeting.task.call_events", "Call event consumer stopped");
}

/// Process one raw event payload.
pub async fn handle_call_event(service: &MeetingService, payload: &[u8]) -> CallEventOutcome {
    let outcome = match CallHangupEvent::from_slice(payload) {
        Err(e) => {
            warn!(target: "meeting.task.call_events", error = %e, "Failed to parse call event");
            CallEventOutcome::Unparseable
        }
        Ok(event) => match event.data.meeting_id.as_deref() {
            None => {
                debug!(
                    target: "meeting.task.call_events",
                    call_id = %event.id,
                    "Skipping call without meeting reference"
                );
                CallEventOutcome::Skipped
            }
            Some(meeting) => {
                match service
                    .close_by_call(meeting, &event.id, event.bridged())
                    .await
                {
                    Ok(CallLink::Linked(_)) => {
                        debug!(
                            target: "meeting.task.call_events",
                            call_id = %event.id,
                            cause = event.data.cause.as_deref().unwrap_or("unknown"),
                            "Call finished, meeting updated"
                        );
                        CallEventOutcome::Linked
                    }
                    Ok(CallLink::AlreadyLinked(_)) => CallEventOutcome::AlreadyLinked,
                    Err(e) => {
                        warn!(
                            target: "meeting.task.call_events",
                            call_id = %event.id,
                            error = %e,
                            "Failed to attach call to meeting"
                        );
                        CallEventOutcome::Failed
                    }
                }
            }
        },
    };

    record_call_event(outcome);
    outcome
}
