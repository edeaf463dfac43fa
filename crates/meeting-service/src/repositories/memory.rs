//! In-process meeting cache.
//!
//! A bounded [`LruCache`] guarded by one async mutex. Capacity pressure evicts
//! the least recently used meeting; time-based expiry is applied on read and
//! by the periodic sweep.

use super::{timed, MeetingStore};
use crate::clock::{system_clock, Clock};
use crate::errors::MeetingError;
use crate::models::{ChatCloseInfo, Meeting};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "memory";

/// Bounded in-memory meeting store.
pub struct MemoryMeetingStore {
    meetings: Mutex<LruCache<String, Meeting>>,
    /// Open chat per meeting id, populated by [`MemoryMeetingStore::link_chat`].
    chats: Mutex<HashMap<String, ChatCloseInfo>>,
    clock: Clock,
}

impl MemoryMeetingStore {
    /// Create a cache holding at most `capacity` meetings.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_clock(capacity, system_clock())
    }

    /// Create a cache that reads time from `clock`.
    pub fn with_clock(capacity: NonZeroUsize, clock: Clock) -> Self {
        Self {
            meetings: Mutex::new(LruCache::new(capacity)),
            chats: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Link an open chat conversation to a meeting.
    pub async fn link_chat(&self, meeting_id: &str, info: ChatCloseInfo) {
        self.chats.lock().await.insert(meeting_id.to_string(), info);
    }

    /// Drop the chat link of a meeting.
    pub async fn unlink_chat(&self, meeting_id: &str) -> Option<ChatCloseInfo> {
        self.chats.lock().await.remove(meeting_id)
    }

    /// Number of cached meetings, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.meetings.lock().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.meetings.lock().await.is_empty()
    }
}

#[async_trait]
impl MeetingStore for MemoryMeetingStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip_all, name = "meeting.repo.memory.create")]
    async fn create(&self, meeting: &Meeting) -> Result<(), MeetingError> {
        timed(BACKEND, "create", async {
            let now = (self.clock)();
            let mut meetings = self.meetings.lock().await;

            // An expired leftover with the same id is replaced
            if meetings
                .peek(&meeting.id)
                .is_some_and(|existing| existing.is_visible_at(now))
            {
                return Err(MeetingError::AlreadyExists);
            }

            if let Some((evicted, _)) = meetings.push(meeting.id.clone(), meeting.clone()) {
                if evicted != meeting.id {
                    tracing::debug!(
                        target: "meeting.repo.memory",
                        "Capacity reached, evicted least recently used meeting"
                    );
                }
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.get")]
    async fn get(&self, id: &str) -> Result<Meeting, MeetingError> {
        timed(BACKEND, "get", async {
            let now = (self.clock)();
            let mut meetings = self.meetings.lock().await;

            let meeting = meetings.get(id).cloned().ok_or(MeetingError::NotFound)?;
            if !meeting.is_visible_at(now) {
                meetings.pop(id);
                tracing::debug!(target: "meeting.repo.memory", "Evicted expired meeting on read");
                return Err(MeetingError::NotFound);
            }
            Ok(meeting)
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.delete")]
    async fn delete(&self, id: &str) -> Result<(), MeetingError> {
        timed(BACKEND, "delete", async {
            let removed = self.meetings.lock().await.pop(id);
            if removed.is_none() {
                return Err(MeetingError::NotFound);
            }
            self.chats.lock().await.remove(id);
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.set_call")]
    async fn set_call(&self, id: &str, call_id: &str, bridged: bool) -> Result<(), MeetingError> {
        timed(BACKEND, "set_call", async {
            let mut meetings = self.meetings.lock().await;
            let meeting = meetings.get_mut(id).ok_or(MeetingError::NotFound)?;
            meeting.call_id = Some(call_id.to_string());
            meeting.bridged = bridged;
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.set_satisfaction")]
    async fn set_satisfaction(&self, id: &str, satisfaction: &str) -> Result<(), MeetingError> {
        timed(BACKEND, "set_satisfaction", async {
            let mut meetings = self.meetings.lock().await;
            let meeting = meetings.get_mut(id).ok_or(MeetingError::NotFound)?;
            meeting.satisfaction = Some(satisfaction.to_string());
            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.delete_expired")]
    async fn delete_expired(&self, now: i64) -> Result<u64, MeetingError> {
        timed(BACKEND, "delete_expired", async {
            let mut meetings = self.meetings.lock().await;
            let expired: Vec<String> = meetings
                .iter()
                .filter(|(_, meeting)| meeting.is_expired_at(now))
                .map(|(id, _)| id.clone())
                .collect();

            for id in &expired {
                meetings.pop(id);
            }
            drop(meetings);

            if !expired.is_empty() {
                let mut chats = self.chats.lock().await;
                for id in &expired {
                    chats.remove(id);
                }
            }

            Ok(expired.len() as u64)
        })
        .await
    }

    #[instrument(skip_all, name = "meeting.repo.memory.get_chat_close_info")]
    async fn get_chat_close_info(&self, id: &str) -> Result<Option<ChatCloseInfo>, MeetingError> {
        timed(BACKEND, "get_chat_close_info", async {
            Ok(self.chats.lock().await.get(id).cloned())
        })
        .await
    }

    async fn ping(&self) -> Result<(), MeetingError> {
        Ok(())
    }
}
