//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] wrappers used for every value that must never
//! reach a log line: the token cipher secret, collaborator bearer tokens and
//! derived key material.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so a
//! struct that derives `Debug` over a secret field prints `[REDACTED]` instead
//! of the value. Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct CipherSettings {
//!     key_id: String,
//!     secret: SecretString,
//! }
//!
//! let settings = CipherSettings {
//!     key_id: "primary".to_string(),
//!     secret: SecretString::from("operator-supplied-secret"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("operator-supplied-secret"));
//! let raw: &str = settings.secret.expose_secret();
//! assert_eq!(raw, "operator-supplied-secret");
//! ```
//!
//! # Usage
//!
//! Use `SecretString` for:
//! - The meeting token secret (`MEETING_TOKEN_SECRET`)
//! - Bearer tokens presented to the chat and call collaborators
//! - Database URLs carrying credentials
//!
//! Use `SecretBox<T>` for binary key material (e.g. `SecretBox<[u8; 32]>`).

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
