//! OpenID Connect provider metadata discovery.
//!
//! Fetches `{issuer}/.well-known/openid-configuration` once at startup so
//! that request handlers work from an immutable set of endpoints.

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// OpenID provider metadata (OpenID Connect Discovery 1.0, section 3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// Userinfo endpoint (optional)
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    /// JWKS URI (optional)
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Supported grant types. Absent means the provider did not advertise them.
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// Supported scopes (may be string or array)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,
}

/// Deserialize scopes that may be either a space-separated string or an array
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

impl ProviderMetadata {
    /// Discover provider metadata for `issuer`
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery document is unreachable, invalid, or
    /// names a different issuer.
    pub async fn discover(client: &Client, issuer: &str) -> Result<Self> {
        let url = discovery_url(issuer);
        debug!(url = %url, "Discovering OpenID provider metadata");

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to fetch provider metadata: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Provider metadata discovery failed: HTTP {}",
                response.status()
            )));
        }

        let metadata: Self = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse provider metadata: {e}")))?;

        if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(Error::Provider(format!(
                "Issuer mismatch: expected {issuer}, got {}",
                metadata.issuer
            )));
        }

        if !metadata.supports_grant("password") {
            warn!(issuer = %metadata.issuer, "Provider does not advertise the password grant");
        }

        debug!(issuer = %metadata.issuer, token_endpoint = %metadata.token_endpoint, "Discovered provider");
        Ok(metadata)
    }

    /// Whether `grant` is advertised. An empty `grant_types_supported` allows any grant.
    #[must_use]
    pub fn supports_grant(&self, grant: &str) -> bool {
        self.grant_types_supported.is_empty() || self.grant_types_supported.iter().any(|g| g == grant)
    }
}

/// Well-known discovery URL for an issuer
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_url_handles_trailing_slash() {
        assert_eq!(
            discovery_url("https://idp.example.com/oidc/"),
            "https://idp.example.com/oidc/.well-known/openid-configuration"
        );
        assert_eq!(
            discovery_url("https://idp.example.com"),
            "https://idp.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn metadata_accepts_string_scopes() {
        let json = serde_json::json!({
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/auth",
            "token_endpoint": "https://idp.example.com/token",
            "scopes_supported": "openid groups offline_access"
        });
        let meta: ProviderMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.scopes_supported, vec!["openid", "groups", "offline_access"]);
        assert!(meta.jwks_uri.is_none());
    }

    #[test]
    fn supports_grant_checks_advertised_list() {
        let json = serde_json::json!({
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/auth",
            "token_endpoint": "https://idp.example.com/token",
            "grant_types_supported": ["authorization_code", "refresh_token"]
        });
        let meta: ProviderMetadata = serde_json::from_value(json).unwrap();
        assert!(meta.supports_grant("refresh_token"));
        assert!(!meta.supports_grant("password"));
    }

    #[test]
    fn empty_grant_list_is_permissive() {
        let json = serde_json::json!({
            "issuer": "https://idp.example.com",
            "authorization_endpoint": "https://idp.example.com/auth",
            "token_endpoint": "https://idp.example.com/token"
        });
        let meta: ProviderMetadata = serde_json::from_value(json).unwrap();
        assert!(meta.supports_grant("password"));
    }
}
