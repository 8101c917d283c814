//! HTTP middleware for outbound identity provider calls
//!
//! Implements `reqwest-middleware::Middleware` to log every provider round trip.
//! Only the method, path, status and latency are recorded: request and response
//! bodies carry codes, secrets and tokens and are never logged.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Middleware that logs outbound provider calls without their payloads
pub struct ProviderCallLogger;

#[async_trait]
impl Middleware for ProviderCallLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let host = req.url().host_str().unwrap_or_default().to_string();
        let path = req.url().path().to_string();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) if response.status().is_success() => {
                debug!(%method, %host, %path, status = response.status().as_u16(), elapsed_ms, "Provider call completed");
            }
            Ok(response) => {
                warn!(%method, %host, %path, status = response.status().as_u16(), elapsed_ms, "Provider call returned error status");
            }
            Err(e) => {
                warn!(%method, %host, %path, elapsed_ms, error = %e, "Provider call failed");
            }
        }

        result
    }
}

/// Build the pooled HTTP client used for every call to the identity provider
pub fn provider_http_client(timeout: Duration) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

    Ok(ClientBuilder::new(client).with(ProviderCallLogger).build())
}
