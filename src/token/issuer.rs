//! Provider grants: resource-owner password, authorization-code redirect,
//! refresh token.
//!
//! [`IdentityProvider`] is the seam the router depends on; [`OidcProvider`]
//! is the `reqwest` implementation. Each grant is a single attempt: timeouts
//! come from the configured client and nothing is retried here. Dropping the
//! returned future (the caller disconnected) drops the in-flight request.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};
use url::{Url, form_urlencoded};

use super::{Credential, ProviderToken, discovery::ProviderMetadata};
use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Failure talking to the identity provider.
///
/// The gateway reports every variant as `401 Unauthorized`; the `Display`
/// text is passed through to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The token endpoint could not be reached
    #[error("oauth2: cannot fetch token: {0}")]
    Unreachable(String),

    /// The provider answered with a non-success status
    #[error("oauth2: cannot fetch token: {status}\nResponse: {body}")]
    Rejected {
        /// HTTP status returned by the provider
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// The provider answered 2xx with an unusable body
    #[error("oauth2: cannot parse token response: {0}")]
    Malformed(String),
}

/// Authorization-code redirect target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Fully-built authorization URL
    pub url: Url,
    /// Opaque `state` parameter embedded in `url`
    pub state: String,
}

/// Operations the broker needs from an identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resource-owner password credentials grant (RFC 6749 §4.3)
    async fn password_token(&self, credential: &Credential) -> std::result::Result<ProviderToken, ProviderError>;

    /// Authorization URL for the authorization-code flow. Pure construction.
    fn redirect_target(&self) -> RedirectTarget;

    /// Refresh token grant (RFC 6749 §6)
    async fn refresh_token(&self, refresh_token: &str) -> std::result::Result<ProviderToken, ProviderError>;
}

/// Resolved provider endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    /// Authorization endpoint
    pub authorization: Url,
    /// Token endpoint
    pub token: String,
}

impl ProviderEndpoints {
    /// Endpoints from explicit configuration or discovery metadata
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization endpoint is not a valid URL.
    pub fn new(authorization: &str, token: &str) -> Result<Self> {
        let authorization = Url::parse(authorization)
            .map_err(|e| Error::Config(format!("Invalid authorization endpoint: {e}")))?;
        Ok(Self {
            authorization,
            token: token.to_string(),
        })
    }
}

/// RFC 6749 §5.1 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Deserialize `expires_in` sent either as a number or as a quoted number
fn deserialize_expires_in<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// RFC 6749 §2.3.1: client credentials are form-encoded before Basic encoding
fn form_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `reqwest`-backed OIDC / OAuth2 provider
pub struct OidcProvider {
    http_client: Client,
    endpoints: ProviderEndpoints,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl OidcProvider {
    /// Create a provider with already-resolved endpoints
    #[must_use]
    pub fn new(http_client: Client, endpoints: ProviderEndpoints, config: &ProviderConfig) -> Self {
        Self {
            http_client,
            endpoints,
            client_id: config.client_id.clone(),
            client_secret: config.resolve_client_secret(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
        }
    }

    /// Build the HTTP client and resolve endpoints, running discovery when
    /// the configuration does not name both endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the CA file cannot be read, the client cannot be
    /// built, or discovery fails.
    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        let http_client = build_http_client(config)?;

        let endpoints = match (&config.authorization_endpoint, &config.token_endpoint) {
            (Some(authorization), Some(token)) => ProviderEndpoints::new(authorization, token)?,
            _ => {
                let meta = ProviderMetadata::discover(&http_client, &config.issuer).await?;
                ProviderEndpoints::new(
                    config
                        .authorization_endpoint
                        .as_deref()
                        .unwrap_or(&meta.authorization_endpoint),
                    config.token_endpoint.as_deref().unwrap_or(&meta.token_endpoint),
                )?
            }
        };

        info!(
            issuer = %config.issuer,
            client_id = %config.client_id,
            token_endpoint = %endpoints.token,
            "Identity provider ready"
        );

        Ok(Self::new(http_client, endpoints, config))
    }

    /// Resolved endpoints
    #[must_use]
    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    async fn request_token(
        &self,
        grant: &'static str,
        params: &[(&str, &str)],
    ) -> std::result::Result<ProviderToken, ProviderError> {
        let scope = self.scopes.join(" ");
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 3);
        form.push(("grant_type", grant));
        form.extend_from_slice(params);
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        // Confidential clients authenticate with HTTP Basic, public ones in the body
        let request = self.http_client.post(&self.endpoints.token);
        let request = match self.client_secret.as_deref() {
            Some(secret) => request.basic_auth(form_encode(&self.client_id), Some(form_encode(secret))),
            None => {
                form.push(("client_id", self.client_id.as_str()));
                request
            }
        }
        .form(&form);

        debug!(grant, token_endpoint = %self.endpoints.token, "Requesting provider token");

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(ProviderError::Malformed("server response missing access_token".to_string()));
        }

        Ok(ProviderToken::from_response(
            body.access_token,
            body.token_type,
            body.refresh_token,
            body.expires_in,
            body.id_token,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    async fn password_token(&self, credential: &Credential) -> std::result::Result<ProviderToken, ProviderError> {
        self.request_token(
            "password",
            &[
                ("username", credential.username.as_str()),
                ("password", credential.password.as_str()),
            ],
        )
        .await
    }

    fn redirect_target(&self) -> RedirectTarget {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let mut url = self.endpoints.authorization.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.client_id);
            if !self.redirect_uri.is_empty() {
                params.append_pair("redirect_uri", &self.redirect_uri);
            }
            if !self.scopes.is_empty() {
                params.append_pair("scope", &self.scopes.join(" "));
            }
            params.append_pair("state", &state);
        }
        RedirectTarget { url, state }
    }

    async fn refresh_token(&self, refresh_token: &str) -> std::result::Result<ProviderToken, ProviderError> {
        self.request_token("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }
}

fn build_http_client(config: &ProviderConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.timeout.min(Duration::from_secs(5)));

    if let Some(ref path) = config.ca_file {
        let pem = std::fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem)?;
        builder = builder.add_root_certificate(cert);
    }

    Ok(builder.build()?)
}
