//! Token lifecycle: credential extraction, provider grants, session cookies.
//!
//! ```text
//! POST /tokens        -> credential::extract -> IdentityProvider::password_token -> responder::respond
//! POST /tokens/renew  -> SessionToken (cookie) -> IdentityProvider::refresh_token -> responder::respond
//! GET  /tokens/redirect -> IdentityProvider::redirect_target
//! ```
//!
//! Every error raised here is terminal for the request and is rendered as a
//! [`Status`] envelope through [`TokenError`].

pub mod credential;
pub mod discovery;
pub mod issuer;
pub mod responder;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::status::Status;

pub use credential::{Credential, MissingCredential};
pub use discovery::ProviderMetadata;
pub use issuer::{IdentityProvider, OidcProvider, ProviderEndpoints, ProviderError, RedirectTarget};
pub use responder::{ResponseWriteError, SessionToken};

/// Token issued by the identity provider.
///
/// Lives only for the request that obtained it; the broker never stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderToken {
    /// OAuth2 access token
    pub access_token: String,
    /// Token type, usually `Bearer`
    pub token_type: String,
    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Absolute expiry
    pub expiry: Option<DateTime<Utc>>,
    /// OIDC ID token, used as the bearer credential for the API server
    pub id_token: Option<String>,
}

impl ProviderToken {
    /// Build from the fields of an RFC 6749 token response, `expires_in`
    /// being relative to `now`. An `expires_in` too large to represent
    /// leaves `expiry` unset.
    #[must_use]
    pub fn from_response(
        access_token: String,
        token_type: Option<String>,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        id_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expiry = expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(ChronoDuration::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta));

        Self {
            access_token,
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            expiry,
            id_token: id_token.filter(|t| !t.is_empty()),
        }
    }

    /// Keep `previous` as refresh token when the provider did not rotate it.
    #[must_use]
    pub fn or_refresh_token(mut self, previous: &str) -> Self {
        if self.refresh_token.is_none() && !previous.is_empty() {
            self.refresh_token = Some(previous.to_string());
        }
        self
    }
}

/// Request-level broker errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Username or password missing from the request
    #[error(transparent)]
    MissingCredential(#[from] MissingCredential),

    /// Provider rejected the grant or could not be reached
    #[error("{0}")]
    Unauthorized(String),

    /// Writing the token representation failed
    #[error("Internal error occurred: {0}")]
    Internal(String),
}

impl TokenError {
    /// HTTP status for this error. Credential problems are always 401, never 400.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProviderError> for TokenError {
    fn from(err: ProviderError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl From<ResponseWriteError> for TokenError {
    fn from(err: ResponseWriteError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        Status::failure(self.status_code(), self.to_string()).into_response()
    }
}
