//! Meeting lifecycle service.
//!
//! The only component that enforces meeting invariants. It issues and
//! redeems opaque tokens, applies the expiry rule, guards the write-once
//! `call_id` and `satisfaction` fields, and drives the chat and call
//! collaborators.
//!
//! # Expiry
//!
//! A meeting past `expires_at` is reported as absent unless a call is already
//! attached; an in-progress or finished call keeps its meeting readable until
//! the sweep removes it.
//!
//! # Token failures
//!
//! Malformed and unauthenticated tokens are told apart in logs and metrics
//! only. Callers always receive [`MeetingError::InvalidToken`].

use crate::clock::{system_clock, Clock};
use crate::crypto::{TokenCipher, TokenError};
use crate::errors::MeetingError;
use crate::models::{
    compute_expires_at, generate_meeting_id, is_meeting_id, CreateMeetingResponse, Meeting,
    MeetingView, DEFAULT_TTL_SECONDS, MAX_SATISFACTION_LENGTH, MAX_TITLE_LENGTH,
    SATISFACTION_VARIABLE,
};
use crate::observability::metrics::{
    record_meeting_created, record_satisfaction, record_token_rejection, TokenRejection,
};
use crate::repositories::MeetingStore;
use crate::services::call_client::CallVariables;
use crate::services::chat_client::ChatCloser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Result of attaching a call to a meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallLink {
    /// The call was attached.
    Linked(String),
    /// The meeting already had a call; nothing changed.
    AlreadyLinked(String),
}

impl CallLink {
    /// Internal id of the meeting.
    pub fn meeting_id(&self) -> &str {
        match self {
            CallLink::Linked(id) | CallLink::AlreadyLinked(id) => id,
        }
    }
}

/// Orchestrates tokens, the store and the collaborators.
pub struct MeetingService {
    store: Arc<dyn MeetingStore>,
    cipher: Arc<TokenCipher>,
    chat: Arc<dyn ChatCloser>,
    calls: Arc<dyn CallVariables>,
    default_ttl: i64,
    clock: Clock,
}

impl MeetingService {
    /// Create a service over `store` with the default TTL and the system clock.
    pub fn new(
        store: Arc<dyn MeetingStore>,
        cipher: Arc<TokenCipher>,
        chat: Arc<dyn ChatCloser>,
        calls: Arc<dyn CallVariables>,
    ) -> Self {
        Self {
            store,
            cipher,
            chat,
            calls,
            default_ttl: DEFAULT_TTL_SECONDS,
            clock: system_clock(),
        }
    }

    /// Override the TTL applied when a caller asks for zero or less.
    pub fn with_default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl = seconds;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn MeetingStore> {
        &self.store
    }

    /// Create a meeting and return its token and join URL.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an empty or oversized title or an empty base path
    /// - `AlreadyExists` on an id collision
    /// - `Internal`/`Database` when id generation, encryption or persistence fails
    #[instrument(skip_all, name = "meeting.service.create_meeting", fields(domain_id = domain_id))]
    pub async fn create_meeting(
        &self,
        domain_id: i64,
        title: &str,
        ttl_seconds: i64,
        base_path: &str,
        variables: HashMap<String, String>,
    ) -> Result<CreateMeetingResponse, MeetingError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(MeetingError::BadRequest("title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(MeetingError::BadRequest(format!(
                "title must be at most {MAX_TITLE_LENGTH} characters"
            )));
        }
        let base_path = base_path.trim().trim_end_matches('/');
        if base_path.is_empty() {
            return Err(MeetingError::BadRequest("base_path is required".to_string()));
        }

        let id = generate_meeting_id()?;
        let created_at = (self.clock)();
        let expires_at = compute_expires_at(created_at, ttl_seconds, self.default_ttl);

        let token = self.cipher.issue(&id).map_err(|e| {
            tracing::error!(target: "meeting.service", error = %e, "Failed to issue meeting token");
            MeetingError::Internal("Failed to issue meeting token".to_string())
        })?;
        let url = format!("{base_path}/{token}");

        let meeting = Meeting {
            id,
            domain_id,
            title: title.to_string(),
            created_at,
            expires_at,
            variables,
            url: url.clone(),
            call_id: None,
            bridged: false,
            satisfaction: None,
        };
        self.store.create(&meeting).await?;

        record_meeting_created();
        tracing::info!(
            target: "meeting.service",
            domain_id = domain_id,
            expires_at = expires_at,
            "Meeting created"
        );

        Ok(CreateMeetingResponse { id: token, url })
    }

    /// Redeem `token` and return the meeting view.
    ///
    /// Returns `Ok(None)` when the meeting does not exist or has expired
    /// without a call.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` for any token the cipher rejects
    /// - `Database`/`Internal` for store failures
    #[instrument(skip_all, name = "meeting.service.get_meeting")]
    pub async fn get_meeting(&self, token: &str) -> Result<Option<MeetingView>, MeetingError> {
        let id = self.redeem(token)?;

        match self.fetch_visible(&id).await {
            Ok(meeting) => Ok(Some(MeetingView::from_meeting(meeting, token))),
            Err(MeetingError::NotFound | MeetingError::Expired) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Redeem `token` and delete the meeting.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` for any token the cipher rejects
    /// - `NotFound` if the meeting is absent
    #[instrument(skip_all, name = "meeting.service.delete_meeting")]
    pub async fn delete_meeting(&self, token: &str) -> Result<(), MeetingError> {
        let id = self.redeem(token)?;
        self.store.delete(&id).await?;

        tracing::info!(target: "meeting.service", "Meeting deleted");
        Ok(())
    }

    /// Attach a finished call to a meeting and close any linked chat.
    ///
    /// `identifier` is either an opaque token or, for events from the trusted
    /// call engine, an internal meeting id. Re-delivery of an event for a
    /// meeting that already has a call is a successful no-op. Chat closing is
    /// best effort: its failures are logged and never undo the call link.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` if `identifier` is neither a valid token nor an id
    /// - `NotFound`/`Expired` if the meeting is gone
    #[instrument(skip_all, name = "meeting.service.close_by_call", fields(call_id = %call_id, bridged = bridged))]
    pub async fn close_by_call(
        &self,
        identifier: &str,
        call_id: &str,
        bridged: bool,
    ) -> Result<CallLink, MeetingError> {
        let id = self.resolve_identifier(identifier)?;
        let meeting = self.fetch_visible(&id).await?;

        if meeting.call_id.is_some() {
            tracing::debug!(
                target: "meeting.service",
                "Meeting already linked to a call, ignoring event"
            );
            return Ok(CallLink::AlreadyLinked(id));
        }

        self.store.set_call(&id, call_id, bridged).await?;
        tracing::info!(target: "meeting.service", "Call linked to meeting");

        self.close_linked_chat(&id).await;

        Ok(CallLink::Linked(id))
    }

    /// Record the post-call survey answer.
    ///
    /// The answer is pushed to the call engine first; the meeting is only
    /// updated once that push succeeded.
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an empty or oversized value
    /// - `InvalidToken` for any token the cipher rejects
    /// - `NotFound`/`Expired` if the meeting is gone
    /// - `NotAllowed` without a bridged call or when an answer exists
    /// - Collaborator errors from the call engine push
    #[instrument(skip_all, name = "meeting.service.submit_satisfaction")]
    pub async fn submit_satisfaction(&self, token: &str, value: &str) -> Result<(), MeetingError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MeetingError::BadRequest(
                "satisfaction is required".to_string(),
            ));
        }
        if value.chars().count() > MAX_SATISFACTION_LENGTH {
            return Err(MeetingError::BadRequest(format!(
                "satisfaction must be at most {MAX_SATISFACTION_LENGTH} characters"
            )));
        }

        let id = self.redeem(token)?;
        let meeting = self.fetch_visible(&id).await?;

        let call_id = match (&meeting.call_id, &meeting.satisfaction) {
            (_, Some(_)) => {
                record_satisfaction("not_allowed");
                return Err(MeetingError::NotAllowed(
                    "satisfaction already recorded".to_string(),
                ));
            }
            (Some(call_id), None) if meeting.bridged => call_id.as_str(),
            _ => {
                record_satisfaction("not_allowed");
                return Err(MeetingError::NotAllowed(
                    "no bridged call for this meeting".to_string(),
                ));
            }
        };

        let variables = HashMap::from([(SATISFACTION_VARIABLE.to_string(), value.to_string())]);
        if let Err(e) = self
            .calls
            .set_variables(meeting.domain_id, call_id, &variables)
            .await
        {
            record_satisfaction("error");
            return Err(e);
        }

        self.store.set_satisfaction(&id, value).await.inspect_err(|_| {
            record_satisfaction("error");
        })?;

        record_satisfaction("success");
        tracing::info!(target: "meeting.service", "Satisfaction recorded");
        Ok(())
    }

    /// Decrypt a caller token into an internal id.
    fn redeem(&self, token: &str) -> Result<String, MeetingError> {
        self.cipher.redeem(token).map_err(reject_token)
    }

    /// Resolve a token, falling back to a raw internal id.
    fn resolve_identifier(&self, identifier: &str) -> Result<String, MeetingError> {
        match self.cipher.redeem(identifier) {
            Ok(id) => Ok(id),
            Err(_) if is_meeting_id(identifier) => Ok(identifier.to_string()),
            Err(e) => Err(reject_token(e)),
        }
    }

    /// Fetch a meeting and apply the expiry rule.
    async fn fetch_visible(&self, id: &str) -> Result<Meeting, MeetingError> {
        let meeting = self.store.get(id).await?;
        if !meeting.is_visible_at((self.clock)()) {
            return Err(MeetingError::Expired);
        }
        Ok(meeting)
    }

    async fn close_linked_chat(&self, id: &str) {
        let info = match self.store.get_chat_close_info(id).await {
            Ok(Some(info)) => info,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(target: "meeting.service", error = %e, "Chat link lookup failed");
                return;
            }
        };

        match self.chat.close_chat(&info).await {
            Ok(()) => tracing::info!(target: "meeting.service", "Linked chat closed"),
            Err(e) => {
                tracing::warn!(target: "meeting.service", error = %e, "Failed to close linked chat");
            }
        }
    }
}

/// Collapse a cipher failure into the single caller-visible error.
fn reject_token(err: TokenError) -> MeetingError {
    match err {
        TokenError::Malformed(reason) => {
            record_token_rejection(TokenRejection::Malformed);
            tracing::debug!(target: "meeting.service", reason = %reason, "Rejected malformed token");
            MeetingError::InvalidToken
        }
        TokenError::Invalid => {
            record_token_rejection(TokenRejection::Invalid);
            tracing::debug!(target: "meeting.service", "Rejected unauthenticated token");
            MeetingError::InvalidToken
        }
        TokenError::Crypto(reason) => {
            tracing::error!(target: "meeting.service", reason = %reason, "Token cipher failure");
            MeetingError::Internal("Token cipher failure".to_string())
        }
    }
}
