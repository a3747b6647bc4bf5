//! Session cookie carrying the gateway's token representation.
//!
//! The cookie value is `base64url(json(SessionToken))` without padding. The
//! API server only ever sees the ID token inside it; the refresh token rides
//! along so `POST /tokens/renew` can work without server-side storage.

use std::fmt::Write as _;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProviderToken;
use crate::config::SessionCookieConfig;

/// Failure writing the token representation to the response
#[derive(Debug, thiserror::Error)]
pub enum ResponseWriteError {
    /// The provider response had no `id_token`
    #[error("no id_token in token response")]
    MissingIdToken,

    /// The session could not be serialized
    #[error("failed to encode session token: {0}")]
    Encode(#[from] serde_json::Error),

    /// The encoded cookie is not a valid header value
    #[error("invalid session cookie: {0}")]
    InvalidHeader(String),
}

/// Token representation handed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// OIDC ID token
    pub id: String,
    /// Absolute expiry of the ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Refresh token, when issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionToken {
    /// Session for a provider token
    ///
    /// # Errors
    ///
    /// Returns [`ResponseWriteError::MissingIdToken`] if the token carries no ID token.
    pub fn from_provider(token: &ProviderToken) -> Result<Self, ResponseWriteError> {
        let id = token.id_token.clone().ok_or(ResponseWriteError::MissingIdToken)?;
        Ok(Self {
            id,
            expiry: token.expiry,
            refresh_token: token.refresh_token.clone(),
        })
    }

    /// Encode as a cookie value
    pub fn encode(&self) -> Result<String, ResponseWriteError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a cookie value. `None` for anything that is not a session.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Find and decode the session cookie named `name` in request headers
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, name: &str) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .and_then(|(_, v)| Self::decode(v))
    }

    /// Whether the session expires within `window` of `now`.
    /// Sessions without an expiry never need renewal.
    #[must_use]
    pub fn needs_renewal(&self, window: std::time::Duration, now: DateTime<Utc>) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(window).is_none_or(|deadline| deadline >= expiry)
    }
}

/// Write `token` into `headers` as the session cookie.
///
/// # Errors
///
/// Returns [`ResponseWriteError`] if the token has no ID token or the cookie
/// cannot be encoded.
pub fn respond(
    token: &ProviderToken,
    headers: &mut HeaderMap,
    config: &SessionCookieConfig,
) -> Result<(), ResponseWriteError> {
    let session = SessionToken::from_provider(token)?;
    let value = session.encode()?;

    let mut cookie = format!("{}={value}; Path=/; HttpOnly; SameSite=Lax", config.cookie_name);
    if let Some(expiry) = session.expiry {
        let max_age = (expiry - Utc::now()).num_seconds().max(0);
        let _ = write!(cookie, "; Max-Age={max_age}");
    }
    if config.secure {
        cookie.push_str("; Secure");
    }

    let header = HeaderValue::from_str(&cookie)
        .map_err(|e| ResponseWriteError::InvalidHeader(e.to_string()))?;
    headers.append(SET_COOKIE, header);

    debug!(cookie = %config.cookie_name, expiry = ?session.expiry, "Session cookie written");
    Ok(())
}
