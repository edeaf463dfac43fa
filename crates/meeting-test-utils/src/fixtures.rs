//! Deterministic fixtures for meeting tests.

use meeting_service::config::Config;
use meeting_service::crypto::TokenCipher;
use meeting_service::models::{Meeting, MEETING_ID_ALPHABET, MEETING_ID_LEN};
use std::collections::HashMap;

/// Token secret used by every test cipher and test config.
pub const TEST_TOKEN_SECRET: &str = "meeting-test-token-secret-0123456789";

/// Fixed "now" for tests driven by a manual clock (2024-01-01T00:00:00Z).
pub const TEST_NOW: i64 = 1_704_067_200;

/// Build a config with the test secret, overriding any of the given variables.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars = HashMap::from([
        (
            "MEETING_TOKEN_SECRET".to_string(),
            TEST_TOKEN_SECRET.to_string(),
        ),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
    ]);
    for (name, value) in overrides {
        vars.insert((*name).to_string(), (*value).to_string());
    }
    Config::from_vars(&vars).expect("test config should be valid")
}

/// Cipher keyed with [`TEST_TOKEN_SECRET`].
pub fn test_cipher() -> TokenCipher {
    TokenCipher::from_secret_bytes(TEST_TOKEN_SECRET.as_bytes())
        .expect("test cipher should build")
}

/// Deterministic, well-formed meeting id derived from `seed`.
pub fn test_meeting_id(seed: u8) -> String {
    let alphabet = MEETING_ID_ALPHABET;
    (0..MEETING_ID_LEN)
        .map(|i| {
            let index = (usize::from(seed) + i * 7) % alphabet.len();
            char::from(alphabet[index])
        })
        .collect()
}

/// Builder for meeting records written straight to a store.
///
/// # Example
/// ```rust,ignore
/// let meeting = MeetingBuilder::new(1)
///     .created_at(TEST_NOW)
///     .ttl(60)
///     .with_call("call-1", true)
///     .build();
/// ```
pub struct MeetingBuilder {
    meeting: Meeting,
}

impl MeetingBuilder {
    /// Start from a one-hour meeting created at [`TEST_NOW`].
    pub fn new(seed: u8) -> Self {
        let id = test_meeting_id(seed);
        Self {
            meeting: Meeting {
                url: format!("https://meet.example.com/m/{id}"),
                id,
                domain_id: 1,
                title: "Test meeting".to_string(),
                created_at: TEST_NOW,
                expires_at: TEST_NOW + 3600,
                variables: HashMap::new(),
                call_id: None,
                bridged: false,
                satisfaction: None,
            },
        }
    }

    /// Set the tenant.
    pub fn domain(mut self, domain_id: i64) -> Self {
        self.meeting.domain_id = domain_id;
        self
    }

    /// Set the title.
    pub fn title(mut self, title: &str) -> Self {
        self.meeting.title = title.to_string();
        self
    }

    /// Move creation time, keeping the lifetime.
    pub fn created_at(mut self, created_at: i64) -> Self {
        let ttl = self.meeting.expires_at - self.meeting.created_at;
        self.meeting.created_at = created_at;
        self.meeting.expires_at = created_at + ttl;
        self
    }

    /// Set the lifetime in seconds.
    pub fn ttl(mut self, seconds: i64) -> Self {
        self.meeting.expires_at = self.meeting.created_at + seconds;
        self
    }

    /// Add an application variable.
    pub fn variable(mut self, key: &str, value: &str) -> Self {
        self.meeting
            .variables
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Attach a call.
    pub fn with_call(mut self, call_id: &str, bridged: bool) -> Self {
        self.meeting.call_id = Some(call_id.to_string());
        self.meeting.bridged = bridged;
        self
    }

    /// Record a survey answer.
    pub fn with_satisfaction(mut self, value: &str) -> Self {
        self.meeting.satisfaction = Some(value.to_string());
        self
    }

    pub fn build(self) -> Meeting {
        self.meeting
    }
}

/// Raw call engine hangup payload referencing `meeting`.
///
/// `data` is encoded as a JSON string, the way the call engine publishes it.
pub fn hangup_payload(call_id: &str, meeting: &str, bridged_at: i64) -> Vec<u8> {
    serde_json::json!({
        "id": call_id,
        "app_id": "call-engine",
        "bridged_at": bridged_at,
        "data": serde_json::json!({
            "cause": "NORMAL_CLEARING",
            "meeting_id": meeting,
        })
        .to_string(),
    })
    .to_string()
    .into_bytes()
}
