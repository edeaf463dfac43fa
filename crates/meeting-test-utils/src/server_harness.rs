//! Test server harness for E2E testing
//!
//! Provides `TestMeetingServer` for spawning real meeting service instances
//! in tests. Collaborators are mocks; time comes from a manual clock.

use crate::fixtures::{test_cipher, test_config, TEST_NOW};
use meeting_service::clock::ManualClock;
use meeting_service::config::Config;
use meeting_service::repositories::{MeetingStore, MemoryMeetingStore, PgMeetingStore};
use meeting_service::routes::{self, AppState};
use meeting_service::services::call_client::mock::MockCallVariables;
use meeting_service::services::chat_client::mock::MockChatCloser;
use meeting_service::services::MeetingService;
use meeting_service::tasks::call_events::CALL_EVENT_CHANNEL_CAPACITY;
use meeting_service::tasks::start_call_event_consumer;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the meeting service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<(), anyhow::Error> {
///     let server = TestMeetingServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestMeetingServer {
    addr: SocketAddr,
    config: Config,
    service: Arc<MeetingService>,
    memory_store: Option<Arc<MemoryMeetingStore>>,
    chat: Arc<MockChatCloser>,
    calls: Arc<MockCallVariables>,
    clock: ManualClock,
    call_events: mpsc::Sender<Vec<u8>>,
    cancel_token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestMeetingServer {
    /// Spawn a server backed by the in-memory store.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server and the call event consumer in the background
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_calls(MockCallVariables::new()).await
    }

    /// Spawn a memory-backed server whose call engine is `calls`.
    pub async fn spawn_with_calls(calls: MockCallVariables) -> Result<Self, anyhow::Error> {
        let clock = ManualClock::new(TEST_NOW);
        let capacity = NonZeroUsize::new(1024)
            .ok_or_else(|| anyhow::anyhow!("cache capacity must be non-zero"))?;
        let store = Arc::new(MemoryMeetingStore::with_clock(capacity, clock.clock()));

        Self::start(store.clone(), Some(store), clock, calls).await
    }

    /// Spawn a server backed by PostgreSQL.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    pub async fn spawn_with_pool(pool: PgPool) -> Result<Self, anyhow::Error> {
        let store = Arc::new(PgMeetingStore::new(pool));
        Self::start(
            store,
            None,
            ManualClock::new(TEST_NOW),
            MockCallVariables::new(),
        )
        .await
    }

    async fn start(
        store: Arc<dyn MeetingStore>,
        memory_store: Option<Arc<MemoryMeetingStore>>,
        clock: ManualClock,
        calls: MockCallVariables,
    ) -> Result<Self, anyhow::Error> {
        let config = test_config(&[]);
        let chat = Arc::new(MockChatCloser::new());
        let calls = Arc::new(calls);

        let service = Arc::new(
            MeetingService::new(store, Arc::new(test_cipher()), chat.clone(), calls.clone())
                .with_default_ttl(config.default_ttl_seconds)
                .with_clock(clock.clock()),
        );

        let state = Arc::new(AppState {
            service: service.clone(),
            config: config.clone(),
        });

        // Standalone recorder: the global one can only be installed once per
        // test process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        let cancel_token = CancellationToken::new();
        let (call_events, call_events_rx) = mpsc::channel(CALL_EVENT_CHANNEL_CAPACITY);
        tokio::spawn(start_call_event_consumer(
            service.clone(),
            call_events_rx,
            cancel_token.clone(),
        ));

        Ok(Self {
            addr,
            config,
            service,
            memory_store,
            chat,
            calls,
            clock,
            call_events,
            cancel_token,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The lifecycle service behind the routes.
    pub fn service(&self) -> &Arc<MeetingService> {
        &self.service
    }

    /// The in-memory store, when the server is memory-backed.
    pub fn memory_store(&self) -> Option<&Arc<MemoryMeetingStore>> {
        self.memory_store.as_ref()
    }

    /// Mock chat service.
    pub fn chat(&self) -> &MockChatCloser {
        &self.chat
    }

    /// Mock call engine.
    pub fn calls(&self) -> &MockCallVariables {
        &self.calls
    }

    /// Clock shared by the service and the memory store.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Publish a raw call event, as the broker would.
    pub async fn publish_call_event(&self, payload: Vec<u8>) -> Result<(), anyhow::Error> {
        self.call_events
            .send(payload)
            .await
            .map_err(|_| anyhow::anyhow!("Call event consumer stopped"))
    }
}

impl Drop for TestMeetingServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestMeetingServer::spawn().await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "memory");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_provides_addr() -> Result<(), anyhow::Error> {
        let server = TestMeetingServer::spawn().await?;
        let addr = server.addr();

        assert!(addr.ip().is_loopback());
        assert!(addr.port() > 0);
        assert_eq!(server.url(), format!("http://{}", addr));
        assert_eq!(server.config().bind_address, "127.0.0.1:0");
        assert!(server.memory_store().is_some());

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let server1 = TestMeetingServer::spawn().await?;
        let server2 = TestMeetingServer::spawn().await?;

        assert_ne!(server1.addr(), server2.addr());
        Ok(())
    }
}
