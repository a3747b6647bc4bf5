//! Configuration management

use std::{env, net::IpAddr, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider (OIDC / OAuth2) configuration
    pub provider: ProviderConfig,
    /// Trusted identity header handling
    pub identity: IdentityConfig,
    /// Session cookie written for issued tokens
    pub session: SessionCookieConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // IDENTITY_GATEWAY_PROVIDER__CLIENT_ID -> provider.client_id
        figment = figment.merge(Env::prefixed("IDENTITY_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in provider settings.
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        let provider = &mut self.provider;
        provider.issuer = expand_string(&re, &provider.issuer);
        provider.client_id = expand_string(&re, &provider.client_id);
        provider.redirect_uri = expand_string(&re, &provider.redirect_uri);
        if let Some(secret) = provider.client_secret.as_mut() {
            *secret = expand_string(&re, secret);
        }
        Ok(())
    }

    /// Check that the settings needed to talk to a provider are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        let provider = &self.provider;
        if provider.client_id.is_empty() {
            return Err(Error::Config("provider.client_id is required".to_string()));
        }
        if provider.issuer.is_empty()
            && (provider.token_endpoint.is_none() || provider.authorization_endpoint.is_none())
        {
            return Err(Error::Config(
                "provider.issuer is required unless both provider.token_endpoint and \
                 provider.authorization_endpoint are set"
                    .to_string(),
            ));
        }
        if self.session.cookie_name.is_empty() {
            return Err(Error::Config("session.cookie_name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Expand environment variables in a string
fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9441,
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OIDC issuer URL. Used for discovery when endpoints are not set.
    pub issuer: String,
    /// OAuth2 client identifier
    pub client_id: String,
    /// OAuth2 client secret (supports `env:VAR_NAME`)
    pub client_secret: Option<String>,
    /// Redirect URI registered with the provider for the authorization-code flow
    pub redirect_uri: String,
    /// Scopes requested in every grant
    pub scopes: Vec<String>,
    /// Authorization endpoint override (skips discovery when set with `token_endpoint`)
    pub authorization_endpoint: Option<String>,
    /// Token endpoint override
    pub token_endpoint: Option<String>,
    /// Extra PEM root certificate for talking to the provider
    pub ca_file: Option<PathBuf>,
    /// Timeout for each provider request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            client_secret: None,
            redirect_uri: String::new(),
            scopes: vec!["openid".to_string(), "offline_access".to_string()],
            authorization_endpoint: None,
            token_endpoint: None,
            ca_file: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderConfig {
    /// Resolve the client secret (expand `env:VAR_NAME`)
    #[must_use]
    pub fn resolve_client_secret(&self) -> Option<String> {
        self.client_secret.as_ref().map(|secret| {
            if let Some(var_name) = secret.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| secret.clone())
            } else {
                secret.clone()
            }
        })
    }
}

/// Trusted identity header configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Peer addresses allowed to set `X-Remote-*` headers.
    /// Empty disables the check; every peer is then trusted.
    pub trusted_proxies: Vec<IpAddr>,
    /// Header to read the UID from. Defaults to the username header.
    pub uid_header: Option<String>,
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCookieConfig {
    /// Cookie name carrying the encoded session token
    pub cookie_name: String,
    /// Set the `Secure` attribute
    pub secure: bool,
    /// Renew only when the session expires within this window
    #[serde(with = "humantime_serde")]
    pub renew_before: Duration,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            cookie_name: "tke".to_string(),
            secure: false,
            renew_before: Duration::from_secs(300),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "500ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.parse::<u64>().map_err(serde::de::Error::custom)?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| serde::de::Error::custom(format!("duration too large: {s}")))
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
