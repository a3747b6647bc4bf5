//! Error types for the identity gateway process

use std::io;

use thiserror::Error;

/// Result type alias for the identity gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level errors (startup, configuration, provider resolution).
///
/// Per-request failures use [`crate::token::TokenError`] instead; they are
/// converted into status envelopes and never abort the server.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity provider discovery or setup failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
