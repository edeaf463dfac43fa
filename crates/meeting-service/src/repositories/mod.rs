//! Meeting store contract and its two backends.
//!
//! [`PgMeetingStore`] is the durable backend; [`MemoryMeetingStore`] is a
//! bounded LRU cache used when no database is configured. Both honour the same
//! observable contract:
//!
//! - `get`, `delete`, `set_call` and `set_satisfaction` report
//!   [`MeetingError::NotFound`] for unknown ids
//! - `create` reports [`MeetingError::AlreadyExists`] for a live duplicate id
//! - Every mutation is a single atomic step
//!
//! Write-once rules for `call_id` and `satisfaction` are NOT enforced here;
//! the lifecycle service checks them before calling the store.

mod memory;
mod postgres;

pub use memory::MemoryMeetingStore;
pub use postgres::PgMeetingStore;

use crate::errors::MeetingError;
use crate::models::{ChatCloseInfo, Meeting};
use crate::observability::metrics::record_store_operation;
use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;

/// Persistence contract for meetings.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Backend label for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Insert a new meeting.
    async fn create(&self, meeting: &Meeting) -> Result<(), MeetingError>;

    /// Fetch a meeting by internal id.
    async fn get(&self, id: &str) -> Result<Meeting, MeetingError>;

    /// Remove a meeting.
    async fn delete(&self, id: &str) -> Result<(), MeetingError>;

    /// Attach a call to a meeting.
    async fn set_call(&self, id: &str, call_id: &str, bridged: bool) -> Result<(), MeetingError>;

    /// Record the survey answer.
    async fn set_satisfaction(&self, id: &str, satisfaction: &str) -> Result<(), MeetingError>;

    /// Remove every meeting with `expires_at <= now`; returns how many went.
    async fn delete_expired(&self, now: i64) -> Result<u64, MeetingError>;

    /// Open chat linked to a meeting, if any.
    async fn get_chat_close_info(&self, id: &str) -> Result<Option<ChatCloseInfo>, MeetingError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), MeetingError>;
}

/// Run a store operation and record its duration.
pub(crate) async fn timed<T, F>(
    backend: &'static str,
    operation: &'static str,
    op: F,
) -> Result<T, MeetingError>
where
    F: Future<Output = Result<T, MeetingError>>,
{
    let start = Instant::now();
    let result = op.await;
    let success = matches!(result, Ok(_) | Err(MeetingError::NotFound));
    record_store_operation(backend, operation, success, start.elapsed());
    result
}
