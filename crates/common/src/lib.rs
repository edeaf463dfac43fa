//! Common utilities and types shared across the web meeting components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for reversible base62 short codes over 64-bit identifiers
pub mod short_code;
