//! HTTP router and token handlers

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, FromRequest, Multipart, State},
    http::{HeaderMap, Request, StatusCode, header::LOCATION},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::audit::{self, AuditEvent};
use crate::config::{IdentityConfig, SessionCookieConfig};
use crate::identity::{self, UserInfo, strip_untrusted_identity};
use crate::status::Status;
use crate::token::{
    Credential, IdentityProvider, MissingCredential, ProviderToken, SessionToken, TokenError,
    credential, responder,
};

/// API group served by the gateway
pub const GROUP_NAME: &str = "gateway.tkestack.io";

/// API version served by the gateway
pub const VERSION: &str = "v1";

/// Base path of the token endpoints
pub const TOKENS_PATH: &str = "/apis/gateway.tkestack.io/v1/tokens";

/// Largest form body accepted by `POST /tokens`
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Shared application state. Immutable after startup.
pub struct AppState {
    /// Identity provider used for password and refresh grants
    pub provider: Arc<dyn IdentityProvider>,
    /// Trusted header handling
    pub identity: IdentityConfig,
    /// Session cookie settings
    pub session: SessionCookieConfig,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route(TOKENS_PATH, post(generate_token))
        .route(&format!("{TOKENS_PATH}/"), post(generate_token))
        .route(&format!("{TOKENS_PATH}/info"), get(token_info))
        .route(&format!("{TOKENS_PATH}/redirect"), get(token_redirect))
        .route(&format!("{TOKENS_PATH}/renew"), post(renew_token))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            strip_untrusted_identity,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /tokens` - password grant
async fn generate_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<Response, TokenError> {
    let client_ip = peer_ip(&request);
    let credential = read_credential(request).await.inspect_err(|e| {
        audit::emit(&AuditEvent::invalid(e.to_string(), client_ip));
    })?;

    let token = state
        .provider
        .password_token(&credential)
        .await
        .inspect_err(|e| {
            warn!(username = %credential.username, error = %e, "Password grant failed");
            audit::emit(&AuditEvent::denied(Some(credential.username.as_str()), e.to_string(), client_ip));
        })?;

    let response = write_token(&state.session, &token)?;
    audit::emit(&AuditEvent::issued(&credential.username, client_ip));
    Ok(response)
}

/// Read the credential from a url-encoded or multipart form body.
/// An unreadable body is treated as an empty form.
async fn read_credential(request: Request<Body>) -> Result<Credential, MissingCredential> {
    if credential::is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| MissingCredential)?;
        return credential::extract_multipart(multipart).await;
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .unwrap_or_default();
    credential::extract(&parts.headers, &body)
}

/// `GET /tokens/info` - identity behind the current request
async fn token_info(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<UserInfo> {
    Json(identity::translate(&headers, &state.identity))
}

/// `GET /tokens/redirect` - authorization-code redirect
async fn token_redirect(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let target = state.provider.redirect_target();
    debug!(url = %target.url, "Redirecting to identity provider");
    audit::emit(&AuditEvent::redirect(peer_ip(&request)));

    (
        [(LOCATION, target.url.to_string())],
        Status::success(StatusCode::FOUND),
    )
        .into_response()
}

/// `POST /tokens/renew` - refresh grant using the session cookie
async fn renew_token(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<Response, TokenError> {
    let client_ip = peer_ip(&request);

    let session = SessionToken::from_headers(request.headers(), &state.session.cookie_name);
    let Some((session, refresh_token)) = session.and_then(|s| {
        let refresh = s.refresh_token.clone().filter(|t| !t.is_empty())?;
        Some((s, refresh))
    }) else {
        let err = TokenError::Unauthorized("refresh token is empty".to_string());
        audit::emit(&AuditEvent::invalid(err.to_string(), client_ip));
        return Err(err);
    };

    if !session.needs_renewal(state.session.renew_before, Utc::now()) {
        debug!(expiry = ?session.expiry, "Session still fresh, nothing to renew");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let token = state
        .provider
        .refresh_token(&refresh_token)
        .await
        .inspect_err(|e| {
            warn!(error = %e, "Refresh grant failed");
            audit::emit(&AuditEvent::denied(None, e.to_string(), client_ip));
        })?
        .or_refresh_token(&refresh_token);

    let response = write_token(&state.session, &token)?;
    audit::emit(&AuditEvent::renewed(client_ip));
    Ok(response)
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Write the session cookie, then the `201 Created` envelope.
/// A cookie failure short-circuits before any envelope is produced.
fn write_token(session: &SessionCookieConfig, token: &ProviderToken) -> Result<Response, TokenError> {
    let mut headers = HeaderMap::new();
    responder::respond(token, &mut headers, session).inspect_err(|e| {
        warn!(error = %e, "Failed to write session cookie");
    })?;
    Ok((headers, Status::success(StatusCode::CREATED)).into_response())
}

fn peer_ip(request: &Request<Body>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
