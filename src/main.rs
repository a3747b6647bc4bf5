//! Identity Gateway - token broker for an OIDC / OAuth2 provider

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use identity_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::{Gateway, TOKENS_PATH},
    setup_tracing,
    token::OidcProvider,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&cli).await,
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Validate configuration and resolve provider endpoints without serving
async fn run_check_config(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    match OidcProvider::from_config(&config.provider).await {
        Ok(provider) => {
            let endpoints = provider.endpoints();
            println!("✅ Configuration valid\n");
            println!("   Listen:        {}:{}", config.server.host, config.server.port);
            println!("   Tokens path:   {TOKENS_PATH}");
            println!("   Client ID:     {}", config.provider.client_id);
            println!("   Authorization: {}", endpoints.authorization);
            println!("   Token:         {}", endpoints.token);
            println!("   Cookie:        {}", config.session.cookie_name);
            if config.identity.trusted_proxies.is_empty() {
                println!("   Trusted proxies: any (identity headers are not filtered)");
            } else {
                println!(
                    "   Trusted proxies: {}",
                    config
                        .identity
                        .trusted_proxies
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to resolve identity provider: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        issuer = %config.provider.issuer,
        "Starting Identity Gateway"
    );

    let gateway = match Gateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
