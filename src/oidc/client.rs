//! OIDC client implementation
//!
//! Talks to the identity provider as a confidential OAuth 2.0 client: code
//! exchange, refresh, revocation and ID token verification. Holds no tokens;
//! everything it returns belongs to the request that asked for it.

use super::discovery::ProviderMetadata;
use super::jwks::JwksCache;
use super::login::LoginState;
use super::provider::{IdentityProvider, RevocationOutcome};
use super::token::{TokenResponse, TokenSet};
use super::verify::{IdTokenVerifier, IdentityClaims};
use crate::config::{Config, TokenAuthMethod};
use crate::error::{RelayError, Result};
use crate::middleware::provider_http_client;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// This relay's registration with the provider, plus the resolved endpoints
#[derive(Clone)]
pub struct ClientConfiguration {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_auth_method: TokenAuthMethod,
    pub clock_skew_secs: u64,
    pub metadata: ProviderMetadata,
}

impl ClientConfiguration {
    pub fn new(config: &Config, metadata: ProviderMetadata) -> Self {
        Self {
            issuer: config.oidc.issuer.clone(),
            client_id: config.oidc.client_id.clone(),
            client_secret: config.oidc.client_secret.clone(),
            redirect_uri: config.oidc.redirect_uri.clone(),
            scopes: config.scopes(),
            token_auth_method: config.oidc.token_auth_method,
            clock_skew_secs: config.oidc.clock_skew_secs,
            metadata,
        }
    }
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("token_auth_method", &self.token_auth_method)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// OAuth error body returned by token and revocation endpoints (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Outcome of the last successful readiness probe
struct Readiness {
    reuse_for: Duration,
    last_ok: Mutex<Option<Instant>>,
}

/// OIDC client for a single provider
pub struct OidcClient {
    config: ClientConfiguration,
    http: ClientWithMiddleware,
    verifier: IdTokenVerifier,
    readiness: Readiness,
}

impl OidcClient {
    /// Resolve provider metadata and build the client
    pub async fn discover(config: &Config) -> Result<Self> {
        let http = provider_http_client(Duration::from_secs(config.oidc.http_timeout_secs))?;
        let metadata = ProviderMetadata::discover(&http, &config.oidc.issuer).await?;

        tracing::info!(
            token_endpoint = %metadata.token_endpoint,
            jwks_uri = %metadata.jwks_uri,
            revocation_endpoint = %metadata.revocation_endpoint(),
            "Provider metadata resolved"
        );

        Ok(Self::new(
            ClientConfiguration::new(config, metadata),
            http,
            Duration::from_secs(config.server.readiness_cache_secs),
        ))
    }

    /// Create a client from already-resolved configuration
    pub fn new(config: ClientConfiguration, http: ClientWithMiddleware, readiness_reuse: Duration) -> Self {
        let jwks = JwksCache::new(config.metadata.jwks_uri.clone(), http.clone());
        let verifier = IdTokenVerifier::new(
            config.issuer.clone(),
            config.client_id.clone(),
            config.clock_skew_secs,
            &config.metadata.id_token_signing_alg_values_supported,
            jwks,
        );

        Self {
            config,
            http,
            verifier,
            readiness: Readiness {
                reuse_for: readiness_reuse,
                last_ok: Mutex::new(None),
            },
        }
    }

    pub fn client_config(&self) -> &ClientConfiguration {
        &self.config
    }

    /// POST a form to a provider endpoint, authenticating as this client
    async fn post_authenticated(
        &self,
        endpoint: &str,
        params: Vec<(&str, &str)>,
    ) -> reqwest_middleware::Result<Response> {
        let mut request = self.http.post(endpoint);
        let mut params: Vec<(&str, &str)> = params;

        match self.config.token_auth_method {
            TokenAuthMethod::ClientSecretBasic => {
                // RFC 6749 §2.3.1: credentials are form-encoded before Basic encoding
                let id = form_encode(&self.config.client_id);
                let secret = form_encode(&self.config.client_secret);
                request = request.basic_auth(id, Some(secret));
            }
            TokenAuthMethod::ClientSecretPost => {
                params.push(("client_id", self.config.client_id.as_str()));
                params.push(("client_secret", self.config.client_secret.as_str()));
            }
        }

        request
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    /// Build authorization URL with state and PKCE parameters
    fn authorization_url(&self, login: &LoginState) -> Result<String> {
        let mut url = Url::parse(&self.config.metadata.authorization_endpoint)?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &login.state)
            .append_pair("code_challenge", &login.code_challenge())
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<TokenSet> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        let response = self
            .post_authenticated(&self.config.metadata.token_endpoint, params)
            .await
            .map_err(|e| RelayError::TokenExchangeFailed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = oauth_error_code(response).await;
            return Err(RelayError::TokenExchangeFailed(format!(
                "provider returned {} ({})",
                status, reason
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            RelayError::TokenExchangeFailed(format!("invalid token response: {}", e.without_url()))
        })?;

        Ok(TokenSet::from(token_response))
    }

    async fn verify_identity_token(&self, raw_id_token: &str) -> Result<IdentityClaims> {
        Ok(self.verifier.verify(raw_id_token).await?)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet> {
        let params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .post_authenticated(&self.config.metadata.token_endpoint, params)
            .await
            .map_err(|e| RelayError::ProviderUnreachable(format!("refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let reason = oauth_error_code(response).await;
            let detail = format!("provider returned {} ({})", status, reason);
            // RFC 6749 §5.2 error responses; anything else is an outage, not a verdict
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                    RelayError::RefreshRejected(detail)
                }
                _ => RelayError::ProviderUnreachable(detail),
            });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            RelayError::ProviderUnreachable(format!(
                "invalid refresh response: {}",
                e.without_url()
            ))
        })?;

        Ok(TokenSet::from(token_response))
    }

    async fn revoke_token(&self, token: &str) -> Result<RevocationOutcome> {
        let endpoint = self.config.metadata.revocation_endpoint();
        let response = self
            .post_authenticated(&endpoint, vec![("token", token)])
            .await
            .map_err(|e| RelayError::ProviderUnreachable(format!("revocation request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(RevocationOutcome::Revoked)
        } else {
            Ok(RevocationOutcome::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn check_ready(&self) -> Result<()> {
        let last_ok = *self.readiness.last_ok.lock().await;
        if let Some(at) = last_ok {
            if at.elapsed() < self.readiness.reuse_for {
                return Ok(());
            }
        }

        // No lock across the round trip: concurrent probes resolve in parallel
        let result = ProviderMetadata::discover(&self.http, &self.config.issuer).await;
        *self.readiness.last_ok.lock().await = result.as_ref().ok().map(|_| Instant::now());
        result.map(|_| ())
    }
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Extract the OAuth `error` code from a failed response, never the raw body
async fn oauth_error_code(response: Response) -> String {
    match response.json::<OAuthErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => "no error code".to_string(),
    }
}
