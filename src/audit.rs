//! Audit logging for token lifecycle events.
//!
//! Every event is emitted via `tracing::info!` with the serialized event in
//! the `audit` field.
//!
//! | Event | When |
//! |-------|------|
//! | `token.issued` | A password grant succeeded and the session cookie was written |
//! | `token.renewed` | A refresh grant succeeded and the session cookie was rewritten |
//! | `token.denied` | The provider rejected a grant or could not be reached |
//! | `token.invalid` | The request carried no usable credential or refresh token |
//! | `token.redirect` | An authorization-code redirect was handed out |

use std::net::IpAddr;

use serde::Serialize;

/// Structured audit event
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`)
    pub event: &'static str,
    /// Username, when the request named one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Client IP address (when available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
    /// Human-readable reason for denial or error events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn new(event: &'static str, client_ip: Option<IpAddr>) -> Self {
        Self {
            event,
            username: None,
            client_ip,
            reason: None,
        }
    }

    /// `token.issued`
    #[must_use]
    pub fn issued(username: &str, client_ip: Option<IpAddr>) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::new("token.issued", client_ip)
        }
    }

    /// `token.renewed`
    #[must_use]
    pub fn renewed(client_ip: Option<IpAddr>) -> Self {
        Self::new("token.renewed", client_ip)
    }

    /// `token.denied`
    #[must_use]
    pub fn denied(username: Option<&str>, reason: impl Into<String>, client_ip: Option<IpAddr>) -> Self {
        Self {
            username: username.map(str::to_string),
            reason: Some(reason.into()),
            ..Self::new("token.denied", client_ip)
        }
    }

    /// `token.invalid`
    #[must_use]
    pub fn invalid(reason: impl Into<String>, client_ip: Option<IpAddr>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new("token.invalid", client_ip)
        }
    }

    /// `token.redirect`
    #[must_use]
    pub fn redirect(client_ip: Option<IpAddr>) -> Self {
        Self::new("token.redirect", client_ip)
    }
}

/// Emit an audit event
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "token audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
