//! Identity Gateway Library
//!
//! Token broker that sits between a web console and an OIDC / OAuth2
//! identity provider.
//!
//! # Features
//!
//! - **Password grant**: exchanges form credentials for a provider token and
//!   stores it in a session cookie
//! - **Authorization code**: hands out the provider's authorization URL
//! - **Renewal**: refreshes the session cookie from its refresh token
//! - **Trusted identity**: reports the user behind `X-Remote-*` headers set by
//!   an authenticating proxy
//!
//! Routes live under `/apis/gateway.tkestack.io/v1/tokens`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod status;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    result.map_err(|e| Error::Internal(e.to_string()))
}
