//! Meeting Service
//!
//! Entry point for the meeting token and lifecycle service.

use anyhow::Context;
use common::secret::ExposeSecret;
use meeting_service::config::Config;
use meeting_service::crypto::TokenCipher;
use meeting_service::observability::metrics::init_metrics_recorder;
use meeting_service::repositories::{MeetingStore, MemoryMeetingStore, PgMeetingStore};
use meeting_service::routes::{self, AppState};
use meeting_service::services::{
    CallVariables, ChatCloser, DisabledCallVariables, DisabledChatCloser, HttpCallVariables,
    HttpChatCloser, MeetingService,
};
use meeting_service::tasks::call_events::CALL_EVENT_CHANNEL_CAPACITY;
use meeting_service::tasks::{start_call_event_consumer, start_expiry_sweep, ExpirySweepConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Meeting Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        default_ttl_seconds = config.default_ttl_seconds,
        sweep_interval_seconds = config.sweep_interval.as_secs(),
        durable = config.uses_database(),
        "Configuration loaded successfully"
    );

    // Install the metrics recorder before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| anyhow::anyhow!(e))?;

    let cipher = TokenCipher::new(&config.token_secret).context("Failed to build token cipher")?;

    let store = build_store(&config).await?;

    let chat: Arc<dyn ChatCloser> = match &config.chat_service_url {
        Some(url) => Arc::new(HttpChatCloser::new(url.clone(), config.service_token.clone())?),
        None => {
            warn!("CHAT_SERVICE_URL not set, chat closing disabled");
            Arc::new(DisabledChatCloser)
        }
    };
    let calls: Arc<dyn CallVariables> = match &config.call_engine_url {
        Some(url) => Arc::new(HttpCallVariables::new(
            url.clone(),
            config.service_token.clone(),
        )?),
        None => {
            warn!("CALL_ENGINE_URL not set, satisfaction submission disabled");
            Arc::new(DisabledCallVariables)
        }
    };

    let service = Arc::new(
        MeetingService::new(store.clone(), Arc::new(cipher), chat, calls)
            .with_default_ttl(config.default_ttl_seconds),
    );

    // Background tasks share one cancellation token
    let cancel_token = CancellationToken::new();

    let sweep_handle = tokio::spawn(start_expiry_sweep(
        store,
        ExpirySweepConfig::with_interval(config.sweep_interval),
        cancel_token.clone(),
    ));

    // The broker client publishes raw hangup payloads into this channel.
    // The sender is held until shutdown so the consumer stays alive.
    let (call_events_tx, call_events_rx) = mpsc::channel(CALL_EVENT_CHANNEL_CAPACITY);
    let consumer_handle = tokio::spawn(start_call_event_consumer(
        service.clone(),
        call_events_rx,
        cancel_token.clone(),
    ));

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState { service, config });
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Meeting Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, stopping background tasks");
    cancel_token.cancel();
    drop(call_events_tx);

    if let Err(e) = sweep_handle.await {
        error!("Expiry sweep task panicked: {}", e);
    }
    if let Err(e) = consumer_handle.await {
        error!("Call event consumer panicked: {}", e);
    }

    info!("Meeting Service shutdown complete");

    Ok(())
}

/// Connect the durable store when `DATABASE_URL` is set, otherwise build the
/// in-memory cache.
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn MeetingStore>> {
    let Some(database_url) = config.database_url.as_ref() else {
        info!(
            capacity = config.cache_capacity.get(),
            "Using in-memory meeting store"
        );
        return Ok(Arc::new(MemoryMeetingStore::new(config.cache_capacity)));
    };

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(database_url.expose_secret(), 5);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database connection established");
    Ok(Arc::new(PgMeetingStore::new(pool)))
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
