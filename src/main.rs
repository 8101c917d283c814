//! OIDC Relay - Main entry point
//!
//! Serves the login callback, refresh, revoke and probe endpoints for a browser
//! app whose identity provider requires a confidential client.

use oidc_relay::config::{Cli, Config};
use oidc_relay::error::{RelayError, Result};
use oidc_relay::oidc::OidcClient;
use oidc_relay::server;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn setup_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}", cli.log_level())));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_file(&cli.config)?;
    config.apply_cli(cli);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    setup_logging(&cli);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Config file: {}", cli.config);
    info!("OIDC Issuer: {}", config.oidc.issuer);
    info!("Client ID: {}", config.oidc.client_id);
    info!("Scopes: {}", config.scopes().join(" "));
    info!("Redirect URI: {}", config.oidc.redirect_uri);
    info!("Frontend URL: {}", config.frontend.redirect_url);

    if let Err(e) = run_relay(config).await {
        error!("Relay error: {}", e);
        std::process::exit(1);
    }
}

async fn run_relay(config: Config) -> Result<()> {
    info!("Resolving identity provider metadata...");

    let provider = Arc::new(OidcClient::discover(&config).await?);

    info!("OIDC client initialized");

    let server_handle = tokio::spawn(async move { server::run_server(&config, provider).await });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Relay server stopped"),
                Ok(Err(e)) => {
                    error!("Relay server error: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Relay server task panicked: {}", e);
                    return Err(RelayError::Io(std::io::Error::other(format!(
                        "server task panicked: {}",
                        e
                    ))));
                }
            }
        }
    }

    Ok(())
}
