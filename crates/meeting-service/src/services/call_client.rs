//! Call engine HTTP client.
//!
//! Writes variables onto a call record; used to push the post-call survey
//! answer.

use crate::errors::MeetingError;
use crate::services::chat_client::map_collaborator_status;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for call engine requests in seconds.
const CALL_ENGINE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Sets variables on calls held by the call engine.
#[async_trait]
pub trait CallVariables: Send + Sync {
    /// Merge `variables` into the call `call_id` of tenant `domain_id`.
    async fn set_variables(
        &self,
        domain_id: i64,
        call_id: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), MeetingError>;
}

#[derive(Debug, Serialize)]
struct SetVariablesRequest<'a> {
    domain_id: i64,
    variables: &'a HashMap<String, String>,
}

/// HTTP client for the call engine.
#[derive(Clone)]
pub struct HttpCallVariables {
    client: Client,
    base_url: String,
    service_token: Option<SecretString>,
}

impl HttpCallVariables {
    /// Create a new call engine client.
    ///
    /// # Errors
    ///
    /// Returns `MeetingError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, service_token: Option<SecretString>) -> Result<Self, MeetingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CALL_ENGINE_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "meeting.services.call_client", error = %e, "Failed to build HTTP client");
                MeetingError::Internal("Failed to build call engine client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }
}

#[async_trait]
impl CallVariables for HttpCallVariables {
    #[instrument(skip_all, name = "meeting.services.call_client.set_variables", fields(domain_id = domain_id))]
    async fn set_variables(
        &self,
        domain_id: i64,
        call_id: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), MeetingError> {
        let url = format!("{}/api/v1/calls/{}/variables", self.base_url, call_id);

        let mut request = self.client.put(&url).json(&SetVariablesRequest {
            domain_id,
            variables,
        });
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            warn!(target: "meeting.services.call_client", error = %e, "Call engine request failed");
            MeetingError::ServiceUnavailable("Call engine is unavailable".to_string())
        })?;

        map_collaborator_status(response.status(), "Call engine")
    }
}

/// Call variables client used when no call engine is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCallVariables;

#[async_trait]
impl CallVariables for DisabledCallVariables {
    async fn set_variables(
        &self,
        _domain_id: i64,
        _call_id: &str,
        _variables: &HashMap<String, String>,
    ) -> Result<(), MeetingError> {
        warn!(target: "meeting.services.call_client", "Call engine not configured");
        Err(MeetingError::ServiceUnavailable(
            "Call engine is not configured".to_string(),
        ))
    }
}

/// Mock call variables module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A recorded `set_variables` call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedVariables {
        pub domain_id: i64,
        pub call_id: String,
        pub variables: HashMap<String, String>,
    }

    /// Mock call engine that records pushed variables.
    #[derive(Default)]
    pub struct MockCallVariables {
        recorded: Mutex<Vec<RecordedVariables>>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl MockCallVariables {
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

        /// Successful pushes so far.
        pub fn recorded(&self) -> Vec<RecordedVariables> {
            self.recorded
                .lock()
                .map(|recorded| recorded.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CallVariables for MockCallVariables {
        async fn set_variables(
            &self,
            domain_id: i64,
            call_id: &str,
            variables: &HashMap<String, String>,
        ) -> Result<(), MeetingError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.return_error {
                return Err(MeetingError::ServiceUnavailable(
                    "Mock call engine error".to_string(),
                ));
            }

            if let Ok(mut recorded) = self.recorded.lock() {
                recorded.push(RecordedVariables {
                    domain_id,
                    call_id: call_id.to_string(),
                    variables: variables.clone(),
                });
            }
            Ok(())
        }
    }
}
