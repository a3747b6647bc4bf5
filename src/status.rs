//! Status envelope returned for outcomes that carry no data payload.
//!
//! Shape: `{"status": "Success" | "Failure", "code": <http status>, "message"?: "..."}`.
//! The `code` field always mirrors the HTTP status of the enclosing response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Outcome carried by a [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    /// The operation succeeded
    Success,
    /// The operation failed
    Failure,
}

/// Uniform status envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Success or failure
    pub status: StatusKind,
    /// HTTP status code of the response carrying this envelope
    pub code: u16,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    /// A success envelope for `code`
    #[must_use]
    pub fn success(code: StatusCode) -> Self {
        Self {
            status: StatusKind::Success,
            code: code.as_u16(),
            message: None,
        }
    }

    /// A failure envelope for `code` with a message
    #[must_use]
    pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Failure,
            code: code.as_u16(),
            message: Some(message.into()),
        }
    }

    /// The HTTP status this envelope mirrors
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Status {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}
