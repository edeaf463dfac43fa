//! Chat service HTTP client.
//!
//! Closes the chat conversation linked to a meeting once its call has
//! finished.
//!
//! # Security
//!
//! - The service token is sent as a bearer token and never logged
//! - Timeouts prevent hanging connections
//! - Errors are logged server-side with generic messages returned

use crate::errors::MeetingError;
use crate::models::ChatCloseInfo;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for chat requests in seconds.
const CHAT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Cause reported to the chat service when a meeting call ends.
pub const CHAT_CLOSE_CAUSE: &str = "meeting_call_finished";

/// Closes chat conversations linked to meetings.
#[async_trait]
pub trait ChatCloser: Send + Sync {
    /// Close the conversation described by `info`.
    async fn close_chat(&self, info: &ChatCloseInfo) -> Result<(), MeetingError>;
}

#[derive(Debug, Serialize)]
struct CloseConversationRequest<'a> {
    closer_channel_id: &'a str,
    auth_user_id: i64,
    cause: &'a str,
}

/// HTTP client for the chat service.
#[derive(Clone)]
pub struct HttpChatCloser {
    client: Client,
    base_url: String,
    service_token: Option<SecretString>,
}

impl HttpChatCloser {
    /// Create a new chat client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Chat service base URL (e.g., "http://chat:8080")
    /// * `service_token` - Bearer token presented to the chat service
    ///
    /// # Errors
    ///
    /// Returns `MeetingError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, service_token: Option<SecretString>) -> Result<Self, MeetingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CHAT_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "meeting.services.chat_client", error = %e, "Failed to build HTTP client");
                MeetingError::Internal("Failed to build chat client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }
}

#[async_trait]
impl ChatCloser for HttpChatCloser {
    #[instrument(skip_all, name = "meeting.services.chat_client.close_chat")]
    async fn close_chat(&self, info: &ChatCloseInfo) -> Result<(), MeetingError> {
        let url = format!(
            "{}/api/v1/conversations/{}/close",
            self.base_url, info.conversation_id
        );

        let mut request = self.client.post(&url).json(&CloseConversationRequest {
            closer_channel_id: &info.closer_id,
            auth_user_id: info.auth_user_id,
            cause: CHAT_CLOSE_CAUSE,
        });
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            warn!(target: "meeting.services.chat_client", error = %e, "Chat request failed");
            MeetingError::ServiceUnavailable("Chat service is unavailable".to_string())
        })?;

        map_collaborator_status(response.status(), "Chat service")
    }
}

/// Map a collaborator response status onto the service error taxonomy.
pub(crate) fn map_collaborator_status(
    status: reqwest::StatusCode,
    collaborator: &str,
) -> Result<(), MeetingError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        warn!(target: "meeting.services", collaborator = %collaborator, status = %status, "Collaborator returned server error");
        Err(MeetingError::ServiceUnavailable(format!(
            "{collaborator} is unavailable"
        )))
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Err(MeetingError::NotFound)
    } else {
        warn!(target: "meeting.services", collaborator = %collaborator, status = %status, "Unexpected collaborator response");
        Err(MeetingError::Internal(format!(
            "{collaborator} rejected the request with {status}"
        )))
    }
}

/// Chat closer used when no chat service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledChatCloser;

#[async_trait]
impl ChatCloser for DisabledChatCloser {
    async fn close_chat(&self, _info: &ChatCloseInfo) -> Result<(), MeetingError> {
        tracing::debug!(
            target: "meeting.services.chat_client",
            "Chat service not configured, skipping chat close"
        );
        Ok(())
    }
}

/// Mock chat closer module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock chat closer that records every close request.
    #[derive(Default)]
    pub struct MockChatCloser {
        closed: Mutex<Vec<ChatCloseInfo>>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl MockChatCloser {
        /// Create a mock that always succeeds.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a mock that always fails with `ServiceUnavailable`.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::default()
            }
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Conversations closed so far.
        pub fn closed(&self) -> Vec<ChatCloseInfo> {
            self.closed
                .lock()
                .map(|closed| closed.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatCloser for MockChatCloser {
        async fn close_chat(&self, info: &ChatCloseInfo) -> Result<(), MeetingError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.return_error {
                return Err(MeetingError::ServiceUnavailable(
                    "Mock chat closer error".to_string(),
                ));
            }

            if let Ok(mut closed) = self.closed.lock() {
                closed.push(info.clone());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn info() -> ChatCloseInfo {
        ChatCloseInfo {
            conversation_id: "conv-7".to_string(),
            closer_id: "channel-3".to_string(),
            auth_user_id: 99,
        }
    }

    #[tokio::test]
    async fn test_close_chat_posts_to_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/conversations/conv-7/close"))
            .and(header("authorization", "Bearer svc-token"))
            .and(body_json(serde_json::json!({
                "closer_channel_id": "channel-3",
                "auth_user_id": 99,
                "cause": CHAT_CLOSE_CAUSE,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpChatCloser::new(
            format!("{}/", server.uri()),
            Some(SecretString::from("svc-token")),
        )
        .unwrap();

        client.close_chat(&info()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_chat_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HttpChatCloser::new(server.uri(), None).unwrap();
        let result = client.close_chat(&info()).await;
        assert!(matches!(result, Err(MeetingError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_close_chat_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpChatCloser::new(server.uri(), None).unwrap();
        assert!(matches!(
            client.close_chat(&info()).await,
            Err(MeetingError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_close_chat_rejected_is_internal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = HttpChatCloser::new(server.uri(), None).unwrap();
        assert!(matches!(
            client.close_chat(&info()).await,
            Err(MeetingError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_close_chat_unreachable_is_unavailable() {
        // Nothing listens on port 1
        let client = HttpChatCloser::new("http://127.0.0.1:1".to_string(), None).unwrap();
        assert!(matches!(
            client.close_chat(&info()).await,
            Err(MeetingError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_closer_is_noop() {
        assert!(DisabledChatCloser.close_chat(&info()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_and_fails() {
        let mock = mock::MockChatCloser::new();
        mock.close_chat(&info()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.closed(), vec![info()]);

        let failing = mock::MockChatCloser::failing();
        assert!(failing.close_chat(&info()).await.is_err());
        assert_eq!(failing.call_count(), 1);
        assert!(failing.closed().is_empty());
    }
}
