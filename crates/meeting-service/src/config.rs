//! Meeting service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default meeting lifetime in seconds (24 hours).
pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Default in-memory cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;

/// Default expiry sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Minimum accepted token secret length in bytes.
pub const MIN_TOKEN_SECRET_BYTES: usize = 16;

/// Meeting service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// The token secret, service token and database URL are redacted in Debug
/// output.
#[derive(Clone)]
pub struct Config {
    /// Secret the token cipher key is derived from.
    pub token_secret: SecretString,

    /// PostgreSQL connection URL; `None` selects the in-memory store.
    pub database_url: Option<SecretString>,

    /// Server bind address (default: "0.0.0.0:8090").
    pub bind_address: String,

    /// TTL applied when a caller requests zero or less.
    pub default_ttl_seconds: i64,

    /// In-memory store capacity.
    pub cache_capacity: NonZeroUsize,

    /// Expiry sweep interval.
    pub sweep_interval: Duration,

    /// Chat service base URL; `None` disables chat closing.
    pub chat_service_url: Option<String>,

    /// Call engine base URL; `None` disables satisfaction pushes.
    pub call_engine_url: Option<String>,

    /// Bearer token presented to the collaborators.
    pub service_token: Option<SecretString>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("token_secret", &"[REDACTED]")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_address", &self.bind_address)
            .field("default_ttl_seconds", &self.default_ttl_seconds)
            .field("cache_capacity", &self.cache_capacity)
            .field("sweep_interval", &self.sweep_interval)
            .field("chat_service_url", &self.chat_service_url)
            .field("call_engine_url", &self.call_engine_url)
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid token secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_secret = vars
            .get("MEETING_TOKEN_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("MEETING_TOKEN_SECRET".to_string()))?;
        if token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            return Err(ConfigError::InvalidSecret(format!(
                "MEETING_TOKEN_SECRET must be at least {} bytes, got {}",
                MIN_TOKEN_SECRET_BYTES,
                token_secret.len()
            )));
        }
        let token_secret = SecretString::from(token_secret.clone());

        let database_url = non_empty(vars, "DATABASE_URL").map(SecretString::from);

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let default_ttl_seconds = parse_positive::<i64>(vars, "MEETING_DEFAULT_TTL_SECONDS")?
            .unwrap_or(DEFAULT_TTL_SECONDS);

        let cache_capacity = parse_positive::<usize>(vars, "MEETING_CACHE_CAPACITY")?
            .unwrap_or(DEFAULT_CACHE_CAPACITY);
        let cache_capacity = NonZeroUsize::new(cache_capacity).ok_or_else(|| {
            ConfigError::InvalidValue("MEETING_CACHE_CAPACITY must be greater than 0".to_string())
        })?;

        let sweep_interval_seconds = parse_positive::<u64>(vars, "MEETING_SWEEP_INTERVAL_SECONDS")?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

        Ok(Config {
            token_secret,
            database_url,
            bind_address,
            default_ttl_seconds,
            cache_capacity,
            sweep_interval: Duration::from_secs(sweep_interval_seconds),
            chat_service_url: non_empty(vars, "CHAT_SERVICE_URL"),
            call_engine_url: non_empty(vars, "CALL_ENGINE_URL"),
            service_token: non_empty(vars, "SERVICE_TOKEN").map(SecretString::from),
        })
    }

    /// Whether the durable backend is configured.
    pub fn uses_database(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| !url.expose_secret().is_empty())
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Parse an optional strictly positive integer variable.
fn parse_positive<T>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0, got {value}"
        )));
    }

    Ok(Some(value))
}
