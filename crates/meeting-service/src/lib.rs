//! Meeting Service Library
//!
//! Issues opaque meeting tokens and tracks each meeting from creation
//! through its call to the optional post-call survey:
//!
//! - Authenticated-encryption tokens standing in for internal meeting ids
//! - Meeting storage in PostgreSQL or a bounded in-memory cache
//! - Call-completion handling and chat closing
//! - Periodic removal of expired meetings
//!
//! # Architecture
//!
//! The service follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! Background tasks (`tasks`) drive the same service and store.
//!
//! # Modules
//!
//! - `clock` - Injectable time source
//! - `config` - Service configuration from environment
//! - `crypto` - Token cipher
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Meeting store backends
//! - `routes` - Axum router setup
//! - `services` - Meeting lifecycle and collaborator clients
//! - `tasks` - Expiry sweep and call event consumer

pub mod clock;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
