//! Meeting service models.
//!
//! Contains the meeting entity, its caller-facing view, API request and
//! response bodies, and the inbound call-completion event.

use crate::errors::MeetingError;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Lifetime applied when a caller requests a TTL of zero or less (24 hours).
pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Length of an internal meeting identifier.
pub const MEETING_ID_LEN: usize = 21;

/// URL-safe alphabet for internal identifiers (64 symbols).
pub const MEETING_ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Maximum meeting title length.
pub const MAX_TITLE_LENGTH: usize = 512;

/// Maximum satisfaction value length.
pub const MAX_SATISFACTION_LENGTH: usize = 64;

/// Call variable that receives the survey answer.
pub const SATISFACTION_VARIABLE: &str = "meeting_satisfaction";

/// Generate a fresh internal meeting identifier.
///
/// 21 symbols drawn from a 64-symbol alphabet with the system CSPRNG
/// (about 126 bits of entropy). Each random byte is masked to 6 bits, which is
/// unbiased because 256 is a multiple of 64.
pub fn generate_meeting_id() -> Result<String, MeetingError> {
    let mut bytes = [0u8; MEETING_ID_LEN];
    SystemRandom::new().fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "meeting.models", error = %e, "Meeting id generation failed");
        MeetingError::Internal("Meeting id generation failed".to_string())
    })?;

    Ok(bytes
        .iter()
        .filter_map(|b| MEETING_ID_ALPHABET.get(usize::from(b & 0x3f)))
        .map(|&b| char::from(b))
        .collect())
}

/// Whether `value` has the shape of an internal meeting identifier.
pub fn is_meeting_id(value: &str) -> bool {
    value.len() == MEETING_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Compute the expiry timestamp for a meeting created at `created_at`.
///
/// A requested TTL of zero or less falls back to `default_ttl`.
pub fn compute_expires_at(created_at: i64, requested_ttl: i64, default_ttl: i64) -> i64 {
    let ttl = if requested_ttl <= 0 {
        default_ttl
    } else {
        requested_ttl
    };
    created_at.saturating_add(ttl)
}

/// A meeting record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Internal identifier. Never exposed to callers.
    pub id: String,

    /// Tenant scope.
    pub domain_id: i64,

    /// Display title.
    pub title: String,

    /// Creation time (Unix seconds).
    pub created_at: i64,

    /// Nominal expiry (Unix seconds).
    pub expires_at: i64,

    /// Opaque application metadata.
    pub variables: HashMap<String, String>,

    /// Join URL containing the opaque token.
    pub url: String,

    /// Call that bridged to this meeting, once known.
    pub call_id: Option<String>,

    /// Whether the call actually connected.
    pub bridged: bool,

    /// Post-call survey answer, write-once.
    pub satisfaction: Option<String>,
}

impl Meeting {
    /// True iff a bridged call is attached and no satisfaction is recorded yet.
    pub fn allow_satisfaction(&self) -> bool {
        self.bridged && self.call_id.is_some() && self.satisfaction.is_none()
    }

    /// Whether the nominal lifetime has passed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Whether the meeting may be returned to a caller at `now`.
    ///
    /// A meeting with an attached call stays visible past its nominal expiry.
    pub fn is_visible_at(&self, now: i64) -> bool {
        !self.is_expired_at(now) || self.call_id.is_some()
    }
}

/// Caller-facing projection of a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingView {
    /// The opaque token the caller presented.
    pub id: String,
    pub domain_id: i64,
    pub title: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub variables: HashMap<String, String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub bridged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<String>,
    pub allow_satisfaction: bool,
}

impl MeetingView {
    /// Project `meeting` for the caller holding `token`.
    pub fn from_meeting(meeting: Meeting, token: &str) -> Self {
        let allow_satisfaction = meeting.allow_satisfaction();
        Self {
            id: token.to_string(),
            domain_id: meeting.domain_id,
            title: meeting.title,
            created_at: meeting.created_at,
            expires_at: meeting.expires_at,
            variables: meeting.variables,
            url: meeting.url,
            call_id: meeting.call_id,
            bridged: meeting.bridged,
            satisfaction: meeting.satisfaction,
            allow_satisfaction,
        }
    }
}

/// Linkage between a meeting and an open chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCloseInfo {
    /// Conversation to close.
    pub conversation_id: String,

    /// Channel that performs the close.
    pub closer_id: String,

    /// User on whose behalf the chat is closed.
    pub auth_user_id: i64,
}

// ============================================================================
// API Models
// ============================================================================

/// Request body for `POST /v1/meetings`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeetingRequest {
    /// Tenant scope.
    pub domain_id: i64,

    /// Display title.
    pub title: String,

    /// Requested lifetime in seconds; zero or less selects the default.
    #[serde(default)]
    pub expire_sec: i64,

    /// Join URL prefix; the token is appended after a `/`.
    pub base_path: String,

    /// Opaque application metadata.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Response body for `POST /v1/meetings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMeetingResponse {
    /// Opaque meeting token.
    pub id: String,

    /// Join URL.
    pub url: String,
}

/// Request body for `POST /v1/meetings/{token}/satisfaction`.
#[derive(Debug, Clone, Deserialize)]
pub struct SatisfactionRequest {
    pub satisfaction: String,
}

/// Health check response.
///
/// Returned by the `/v1/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status ("healthy" or "unhealthy").
    pub status: String,

    /// Active store backend ("postgres" or "memory").
    pub backend: String,

    /// Store probe status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

// ============================================================================
// Call Events
// ============================================================================

/// Hangup details attached to a call-completion event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HangupData {
    /// Hangup cause reported by the call engine.
    #[serde(default)]
    pub cause: Option<String>,

    /// Meeting token or internal id the call belonged to.
    #[serde(default)]
    pub meeting_id: Option<String>,
}

/// Call-completion event published by the call engine.
#[derive(Debug, Clone, Deserialize)]
pub struct CallHangupEvent {
    /// Call identifier.
    pub id: String,

    /// Call engine application that produced the event.
    #[serde(default)]
    pub app_id: String,

    /// Bridge time (Unix millis); zero when the call never connected.
    #[serde(default)]
    pub bridged_at: i64,

    /// Hangup details, sent either as an object or as a JSON-encoded string.
    #[serde(default, deserialize_with = "deserialize_hangup_data")]
    pub data: HangupData,
}

impl CallHangupEvent {
    /// Parse a raw broker payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Whether the call actually connected.
    pub fn bridged(&self) -> bool {
        self.bridged_at > 0
    }
}

fn deserialize_hangup_data<'de, D>(deserializer: D) -> Result<HangupData, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(HangupData::default()),
        Some(serde_json::Value::String(nested)) if nested.trim().is_empty() => {
            Ok(HangupData::default())
        }
        Some(serde_json::Value::String(nested)) => serde_json::from_str(&nested)
            .map_err(|e| D::Error::custom(format!("failed to parse nested data JSON: {e}"))),
        Some(object) => serde_json::from_value(object)
            .map_err(|e| D::Error::custom(format!("failed to parse data object: {e}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_meeting() -> Meeting {
        Meeting {
            id: "V1StGXR8_Z5jdHi6B-myT".to_string(),
            domain_id: 1,
            title: "Support call".to_string(),
            created_at: 1_000,
            expires_at: 4_600,
            variables: HashMap::from([("k".to_string(), "v".to_string())]),
            url: "https://x/m/token".to_string(),
            call_id: None,
            bridged: false,
            satisfaction: None,
        }
    }

    #[test]
    fn test_generate_meeting_id_shape() {
        let id = generate_meeting_id().unwrap();
        assert_eq!(id.len(), MEETING_ID_LEN);
        assert!(is_meeting_id(&id));
    }

    #[test]
    fn test_generate_meeting_id_is_not_repeated() {
        let ids: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_meeting_id().unwrap()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_meeting_id_rejects_other_shapes() {
        assert!(!is_meeting_id(""));
        assert!(!is_meeting_id("short"));
        assert!(!is_meeting_id("V1StGXR8_Z5jdHi6B-myT1"));
        assert!(!is_meeting_id("V1StGXR8_Z5jdHi6B+myT"));
        assert!(!is_meeting_id("V1StGXR8_Z5jdHi6B/myT"));
    }

    #[test]
    fn test_compute_expires_at_default_for_non_positive_ttl() {
        assert_eq!(compute_expires_at(1_000, 0, DEFAULT_TTL_SECONDS), 87_400);
        assert_eq!(compute_expires_at(1_000, -5, DEFAULT_TTL_SECONDS), 87_400);
        assert_eq!(compute_expires_at(1_000, 3_600, DEFAULT_TTL_SECONDS), 4_600);
    }

    #[test]
    fn test_allow_satisfaction_requires_bridged_call_without_answer() {
        let mut meeting = sample_meeting();
        assert!(!meeting.allow_satisfaction());

        meeting.call_id = Some("call-1".to_string());
        assert!(!meeting.allow_satisfaction(), "referenced but not bridged");

        meeting.bridged = true;
        assert!(meeting.allow_satisfaction());

        meeting.satisfaction = Some("5".to_string());
        assert!(!meeting.allow_satisfaction());
    }

    #[test]
    fn test_grace_rule_visibility() {
        let mut meeting = sample_meeting();
        assert!(meeting.is_visible_at(4_599));
        assert!(!meeting.is_visible_at(4_600));

        meeting.call_id = Some("call-1".to_string());
        assert!(meeting.is_visible_at(10_000));
    }

    #[test]
    fn test_view_carries_token_not_internal_id() {
        let mut meeting = sample_meeting();
        meeting.call_id = Some("call-1".to_string());
        meeting.bridged = true;

        let view = MeetingView::from_meeting(meeting, "opaque-token");
        assert_eq!(view.id, "opaque-token");
        assert!(view.allow_satisfaction);

        let json = serde_json::to_value(&view).unwrap();
        assert!(!json.to_string().contains("V1StGXR8_Z5jdHi6B-myT"));
        assert!(json.get("satisfaction").is_none());
    }

    #[test]
    fn test_call_event_data_as_object() {
        let payload = br#"{
            "id": "call-1",
            "app_id": "engine",
            "bridged_at": 1700000000000,
            "data": {"cause": "NORMAL_CLEARING", "meeting_id": "tok"}
        }"#;

        let event = CallHangupEvent::from_slice(payload).unwrap();
        assert_eq!(event.id, "call-1");
        assert!(event.bridged());
        assert_eq!(event.data.cause.as_deref(), Some("NORMAL_CLEARING"));
        assert_eq!(event.data.meeting_id.as_deref(), Some("tok"));
    }

    #[test]
    fn test_call_event_data_as_json_string() {
        let payload = br#"{
            "id": "call-2",
            "app_id": "engine",
            "data": "{\"cause\":\"USER_BUSY\",\"meeting_id\":\"tok\"}"
        }"#;

        let event = CallHangupEvent::from_slice(payload).unwrap();
        assert!(!event.bridged());
        assert_eq!(event.data.cause.as_deref(), Some("USER_BUSY"));
        assert_eq!(event.data.meeting_id.as_deref(), Some("tok"));
    }

    #[test]
    fn test_call_event_without_data_has_no_meeting() {
        let event = CallHangupEvent::from_slice(br#"{"id": "call-3"}"#).unwrap();
        assert_eq!(event.data, HangupData::default());

        let event =
            CallHangupEvent::from_slice(br#"{"id": "call-4", "data": null}"#).unwrap();
        assert!(event.data.meeting_id.is_none());
    }

    #[test]
    fn test_call_event_with_broken_nested_data_fails() {
        let result = CallHangupEvent::from_slice(br#"{"id": "call-5", "data": "{not json"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_request_defaults() {
        let json = r#"{"domain_id": 1, "title": "t", "base_path": "https://x/m"}"#;
        let request: CreateMeetingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.expire_sec, 0);
        assert!(request.variables.is_empty());
    }
}
