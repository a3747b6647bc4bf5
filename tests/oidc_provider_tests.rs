//! OIDC provider tests against an in-process fake identity provider

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use pretty_assertions::assert_eq;
use serde_json::json;

use identity_gateway::config::ProviderConfig;
use identity_gateway::token::{Credential, IdentityProvider, OidcProvider, ProviderError};

/// One token request as the fake provider saw it
#[derive(Debug, Clone)]
struct Captured {
    authorization: Option<String>,
    form: HashMap<String, String>,
}

#[derive(Clone)]
struct FakeIdp {
    base: String,
    requests: Arc<Mutex<Vec<Captured>>>,
}

async fn discovery(State(idp): State<FakeIdp>) -> Json<serde_json::Value> {
    Json(json!({
        "issuer": idp.base,
        "authorization_endpoint": format!("{}/auth", idp.base),
        "token_endpoint": format!("{}/token", idp.base),
        "grant_types_supported": ["authorization_code", "password", "refresh_token"],
        "scopes_supported": "openid offline_access groups",
    }))
}

async fn token(
    State(idp): State<FakeIdp>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    idp.requests.lock().unwrap().push(Captured {
        authorization: headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string()),
        form: form.clone(),
    });

    if form.get("password").map(String::as_str) == Some("wrong")
        || form.get("refresh_token").map(String::as_str) == Some("revoked")
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant"})),
        )
            .into_response();
    }
    if form.get("username").map(String::as_str) == Some("garbled") {
        return (StatusCode::OK, "not json").into_response();
    }

    let mut body = json!({
        "access_token": "at-1",
        "token_type": "Bearer",
        "expires_in": 3600,
        "id_token": "idt-1",
    });
    if form.get("grant_type").map(String::as_str) == Some("password") {
        body["refresh_token"] = json!("rt-1");
    }
    match form.get("username").map(String::as_str) {
        Some("huge-expiry") => body["expires_in"] = json!(10_000_000_000_000_u64),
        Some("quoted-expiry") => body["expires_in"] = json!("3600"),
        _ => {}
    }
    Json(body).into_response()
}

/// Start the fake provider on an ephemeral port
async fn start_idp() -> FakeIdp {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let idp = FakeIdp {
        base: format!("http://{addr}"),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/.well-known/openid-configuration", get(discovery))
        .route("/token", post(token))
        .with_state(idp.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    idp
}

fn config(idp: &FakeIdp, secret: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        issuer: idp.base.clone(),
        client_id: "console".to_string(),
        client_secret: secret.map(str::to_string),
        redirect_uri: "https://console.example.com/callback".to_string(),
        timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn credential(username: &str, password: &str) -> Credential {
    Credential {
        username: username.to_string(),
        password: password.to_string(),
    }
}

/// GIVEN an issuer WHEN building from config THEN endpoints come from discovery
#[tokio::test]
async fn test_discovery_resolves_endpoints() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    assert_eq!(provider.endpoints().token, format!("{}/token", idp.base));
    assert_eq!(
        provider.endpoints().authorization.as_str(),
        format!("{}/auth", idp.base)
    );

    let target = provider.redirect_target();
    assert!(target.url.as_str().starts_with(&format!("{}/auth?", idp.base)));
}

/// GIVEN explicit endpoints WHEN building from config THEN discovery is skipped
#[tokio::test]
async fn test_explicit_endpoints_skip_discovery() {
    let mut config = config(
        &FakeIdp {
            base: "http://127.0.0.1:9".to_string(),
            requests: Arc::default(),
        },
        None,
    );
    config.authorization_endpoint = Some("https://idp.example.com/auth".to_string());
    config.token_endpoint = Some("https://idp.example.com/token".to_string());

    let provider = OidcProvider::from_config(&config).await.unwrap();
    assert_eq!(provider.endpoints().token, "https://idp.example.com/token");
}

/// GIVEN a public client WHEN running the password grant THEN client_id rides in the form
#[tokio::test]
async fn test_password_grant_public_client() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let token = provider
        .password_token(&credential("admin", "s3cret"))
        .await
        .unwrap();

    assert_eq!(token.access_token, "at-1");
    assert_eq!(token.id_token.as_deref(), Some("idt-1"));
    assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
    assert!(token.expiry.is_some());

    let requests = idp.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let form = &requests[0].form;
    assert_eq!(form["grant_type"], "password");
    assert_eq!(form["username"], "admin");
    assert_eq!(form["password"], "s3cret");
    assert_eq!(form["client_id"], "console");
    assert_eq!(form["scope"], "openid offline_access");
    assert!(requests[0].authorization.is_none());
}

/// GIVEN a confidential client WHEN running the password grant THEN it authenticates with Basic
#[tokio::test]
async fn test_password_grant_confidential_client() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, Some("hush")))
        .await
        .unwrap();

    provider
        .password_token(&credential("admin", "s3cret"))
        .await
        .unwrap();

    let requests = idp.requests.lock().unwrap();
    let expected = format!("Basic {}", STANDARD.encode("console:hush"));
    assert_eq!(requests[0].authorization.as_deref(), Some(expected.as_str()));
    assert!(!requests[0].form.contains_key("client_id"));
}

/// GIVEN a client secret with reserved characters WHEN authenticating THEN both halves are form-encoded
#[tokio::test]
async fn test_password_grant_form_encodes_client_credentials() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, Some("a:b+c%d")))
        .await
        .unwrap();

    provider
        .password_token(&credential("admin", "s3cret"))
        .await
        .unwrap();

    let requests = idp.requests.lock().unwrap();
    let expected = format!("Basic {}", STANDARD.encode("console:a%3Ab%2Bc%25d"));
    assert_eq!(requests[0].authorization.as_deref(), Some(expected.as_str()));
}

/// GIVEN an expires_in too large for a timestamp WHEN running the password grant THEN the token has no expiry
#[tokio::test]
async fn test_password_grant_huge_expires_in() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let token = provider
        .password_token(&credential("huge-expiry", "pw"))
        .await
        .unwrap();

    assert_eq!(token.id_token.as_deref(), Some("idt-1"));
    assert!(token.expiry.is_none());
}

/// GIVEN a quoted expires_in WHEN running the password grant THEN it is parsed as seconds
#[tokio::test]
async fn test_password_grant_quoted_expires_in() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let before = chrono::Utc::now();
    let token = provider
        .password_token(&credential("quoted-expiry", "pw"))
        .await
        .unwrap();

    let expiry = token.expiry.expect("expiry from quoted expires_in");
    assert!(expiry >= before + chrono::Duration::seconds(3600));
    assert!(expiry <= chrono::Utc::now() + chrono::Duration::seconds(3600));
}

/// GIVEN wrong credentials WHEN the provider answers 400 THEN the error is Rejected with the body
#[tokio::test]
async fn test_password_grant_rejected() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let err = provider
        .password_token(&credential("admin", "wrong"))
        .await
        .unwrap_err();

    match err {
        ProviderError::Rejected { status, ref body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

/// GIVEN a 200 with a non-JSON body WHEN running the password grant THEN the error is Malformed
#[tokio::test]
async fn test_password_grant_malformed_response() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let err = provider
        .password_token(&credential("garbled", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

/// GIVEN a refresh token WHEN running the refresh grant THEN the provider sees it
#[tokio::test]
async fn test_refresh_grant() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let token = provider.refresh_token("rt-0").await.unwrap();
    assert_eq!(token.id_token.as_deref(), Some("idt-1"));
    assert!(token.refresh_token.is_none());

    let requests = idp.requests.lock().unwrap();
    assert_eq!(requests[0].form["grant_type"], "refresh_token");
    assert_eq!(requests[0].form["refresh_token"], "rt-0");
}

/// GIVEN a revoked refresh token WHEN running the refresh grant THEN the error is Rejected
#[tokio::test]
async fn test_refresh_grant_rejected() {
    let idp = start_idp().await;
    let provider = OidcProvider::from_config(&config(&idp, None)).await.unwrap();

    let err = provider.refresh_token("revoked").await.unwrap_err();
    assert!(matches!(err, ProviderError::Rejected { status: 400, .. }));
}

/// GIVEN a token endpoint nobody listens on WHEN running a grant THEN the error is Unreachable
#[tokio::test]
async fn test_unreachable_token_endpoint() {
    // Bind then drop to get a port that refuses connections
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ProviderConfig {
        client_id: "console".to_string(),
        authorization_endpoint: Some(format!("http://{addr}/auth")),
        token_endpoint: Some(format!("http://{addr}/token")),
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let provider = OidcProvider::from_config(&config).await.unwrap();

    let err = provider
        .password_token(&credential("admin", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unreachable(_)));
}

/// GIVEN an issuer that does not match its discovery document WHEN building THEN it fails
#[tokio::test]
async fn test_discovery_issuer_mismatch() {
    let idp = start_idp().await;
    let mut config = config(&idp, None);
    // Same server, different issuer string
    config.issuer = idp.base.replace("127.0.0.1", "localhost");

    assert!(OidcProvider::from_config(&config).await.is_err());
}
