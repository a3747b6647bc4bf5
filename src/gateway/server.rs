//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, TOKENS_PATH, create_router};
use crate::config::Config;
use crate::token::{IdentityProvider, OidcProvider};
use crate::{Error, Result};

/// Identity gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Resolved identity provider
    provider: Arc<dyn IdentityProvider>,
}

impl Gateway {
    /// Create a gateway, resolving the identity provider from configuration
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = OidcProvider::from_config(&config.provider).await?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Create a gateway around an already-built provider
    #[must_use]
    pub fn with_provider(config: Config, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { config, provider }
    }

    /// Run the gateway until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        if self.config.identity.trusted_proxies.is_empty() {
            warn!(
                "identity.trusted_proxies is empty - X-Remote-* headers are accepted from any peer"
            );
        }

        let state = Arc::new(AppState {
            provider: self.provider,
            identity: self.config.identity.clone(),
            session: self.config.session.clone(),
        });
        let app = create_router(state);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("IDENTITY GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!("  POST {TOKENS_PATH}/         (password grant)");
        info!("  GET  {TOKENS_PATH}/info     (trusted identity)");
        info!("  GET  {TOKENS_PATH}/redirect (authorization code)");
        info!("  POST {TOKENS_PATH}/renew    (refresh grant)");
        info!(
            trusted_proxies = self.config.identity.trusted_proxies.len(),
            cookie = %self.config.session.cookie_name,
            "Session settings"
        );
        info!("============================================================");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
