//! Relay HTTP server
//!
//! Wires the relay flows to their routes. Each request is independent: the only
//! shared state is the read-only provider client and frontend settings.

pub mod handlers;

use crate::config::Config;
use crate::error::Result;
use crate::oidc::IdentityProvider;
use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub frontend_redirect_url: String,
    pub require_state: bool,
    /// Mark the login cookie `Secure` (the callback is served over HTTPS)
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        Self {
            provider,
            frontend_redirect_url: config.frontend.redirect_url.clone(),
            require_state: config.oidc.require_state,
            secure_cookies: config.oidc.redirect_uri.starts_with("https://"),
        }
    }
}

/// Build the relay router
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/auth/login", get(handlers::login))
        .route("/api/auth/callback", get(handlers::callback))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/revoke", post(handlers::revoke))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .layer(TimeoutLayer::new(request_timeout))
        // Path only: the callback query string carries the authorization code
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!("request", method = %req.method(), path = %req.uri().path())
        }))
        .with_state(state)
}

/// Serve the relay until the future resolves or the listener fails
pub async fn run_server(config: &Config, provider: Arc<dyn IdentityProvider>) -> Result<()> {
    let state = AppState::new(provider, config);
    let app = router(state, Duration::from_secs(config.server.request_timeout_secs));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Relay listening on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  - GET  /api/auth/login");
    tracing::info!("  - GET  /api/auth/callback");
    tracing::info!("  - POST /api/auth/refresh");
    tracing::info!("  - POST /api/auth/revoke");
    tracing::info!("  - GET  /health");
    tracing::info!("  - GET  /ready");

    axum::serve(listener, app).await?;
    Ok(())
}
