//! Trusted identity headers.
//!
//! The upstream proxy validates the bearer token and then sets
//! `X-Remote-User` / `X-Remote-Extra-TenantID`. [`translate`] trusts those
//! headers unconditionally, so they must only reach it from that proxy:
//! [`strip_untrusted_identity`] removes them from every request whose peer
//! is not listed in `identity.trusted_proxies`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IdentityConfig;
use crate::gateway::router::AppState;

/// Authenticated username (also used as UID)
pub const NAME_HEADER: &str = "x-remote-user";

/// Tenant the user is scoped to
pub const TENANT_HEADER: &str = "x-remote-extra-tenantid";

/// Key under which the tenant is stored in [`UserInfo::extra`]
pub const TENANT_ID_KEY: &str = "tenantid";

/// User information derived from trusted headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Username
    pub name: String,
    /// User ID
    pub uid: String,
    /// Group memberships
    #[serde(default)]
    pub groups: Vec<String>,
    /// Extra attributes; omitted when none were supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, Vec<String>>>,
}

/// Build a [`UserInfo`] from request headers. Never fails: a missing
/// username header yields an empty name and UID.
///
/// `uid` is read from the username header unless `config.uid_header` names
/// a different one.
#[must_use]
pub fn translate(headers: &HeaderMap, config: &IdentityConfig) -> UserInfo {
    let name = header_string(headers, NAME_HEADER);
    let uid = match config.uid_header.as_deref() {
        Some(header) => header_string(headers, header),
        None => name.clone(),
    };

    let tenant = header_string(headers, TENANT_HEADER);
    let extra = (!tenant.is_empty())
        .then(|| BTreeMap::from([(TENANT_ID_KEY.to_string(), vec![tenant])]));

    UserInfo {
        name,
        uid,
        groups: Vec::new(),
        extra,
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Whether `peer` may set identity headers
#[must_use]
pub fn is_trusted_peer(config: &IdentityConfig, peer: Option<SocketAddr>) -> bool {
    if config.trusted_proxies.is_empty() {
        return true;
    }
    peer.is_some_and(|addr| {
        let ip = addr.ip().to_canonical();
        config.trusted_proxies.iter().any(|t| t.to_canonical() == ip)
    })
}

/// Remove identity headers set by anyone but a trusted proxy
pub fn strip_identity_headers(headers: &mut HeaderMap, config: &IdentityConfig) {
    headers.remove(NAME_HEADER);
    headers.remove(TENANT_HEADER);
    if let Some(ref uid_header) = config.uid_header {
        headers.remove(uid_header.as_str());
    }
}

/// Middleware enforcing the identity header trust boundary
pub async fn strip_untrusted_identity(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    if !is_trusted_peer(&state.identity, peer) {
        if request.headers().contains_key(NAME_HEADER) || request.headers().contains_key(TENANT_HEADER) {
            debug!(peer = ?peer, "Dropping identity headers from untrusted peer");
        }
        strip_identity_headers(request.headers_mut(), &state.identity);
    }

    next.run(request).await
}
