//! Shared helpers for relay integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mockito::{Mock, ServerGuard};
use oidc_relay::config::Config;
use oidc_relay::error::{RelayError, Result};
use oidc_relay::oidc::{IdentityClaims, IdentityProvider, LoginState, RevocationOutcome, TokenSet};
use oidc_relay::server::{router, AppState};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLIENT_ID: &str = "spa-relay";
pub const CLIENT_SECRET: &str = "s3cret";
pub const KID: &str = "relay-test-key";
pub const FRONTEND_URL: &str = "http://localhost:3000/auth/callback";

const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/rsa_private.pem");
const JWKS: &str = include_str!("../fixtures/jwks.json");

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Relay configuration pointing at `issuer`
pub fn config_for(issuer: &str, extra_oidc: &str) -> Config {
    Config::from_yaml(&format!(
        r#"
server:
  port: 8000
oidc:
  issuer: {issuer}
  clientId: {CLIENT_ID}
  clientSecret: {CLIENT_SECRET}
  redirectUri: http://localhost:8000/api/auth/callback
{extra_oidc}
frontend:
  redirectUrl: {FRONTEND_URL}
"#
    ))
    .unwrap()
}

/// Mock the discovery document and key set of a provider
pub async fn setup_mock_provider(server: &mut ServerGuard, revocation_endpoint: bool) -> (Mock, Mock) {
    let url = server.url();
    let mut metadata = json!({
        "issuer": url,
        "authorization_endpoint": format!("{url}/auth"),
        "token_endpoint": format!("{url}/token"),
        "jwks_uri": format!("{url}/keys"),
        "userinfo_endpoint": format!("{url}/userinfo"),
        "id_token_signing_alg_values_supported": ["RS256"]
    });
    if revocation_endpoint {
        metadata["revocation_endpoint"] = json!(format!("{url}/oauth2/revoke"));
    }

    let discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(metadata.to_string())
        .create_async()
        .await;

    let keys = server
        .mock("GET", "/keys")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(JWKS)
        .create_async()
        .await;

    (discovery, keys)
}

/// Sign an ID token with the fixture key
pub fn sign_id_token(claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap()).unwrap()
}

/// Claims of a valid ID token issued by `issuer` for the test client
pub fn id_token_claims(issuer: &str) -> serde_json::Value {
    let now = now();
    json!({
        "iss": issuer,
        "aud": CLIENT_ID,
        "sub": "user-123",
        "email": "jane@example.com",
        "name": "Jane Doe",
        "iat": now,
        "exp": now + 600
    })
}

pub fn user() -> IdentityClaims {
    IdentityClaims {
        sub: "user-123".to_string(),
        email: "jane@example.com".to_string(),
        name: "Jane Doe".to_string(),
    }
}

/// How the fake provider answers refresh requests
#[derive(Clone)]
pub enum RefreshBehaviour {
    Issue(TokenSet),
    Reject,
    Unreachable,
}

/// In-memory identity provider with call counters
pub struct FakeProvider {
    pub tokens: TokenSet,
    pub exchange_fails: bool,
    pub verify_fails: bool,
    pub refresh: RefreshBehaviour,
    pub revocation: Option<RevocationOutcome>,
    pub ready: bool,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub last_code_verifier: Mutex<Option<String>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            tokens: TokenSet {
                access_token: "at-abc".to_string(),
                refresh_token: Some("rt-def".to_string()),
                id_token: Some("header.payload.signature".to_string()),
                expires_at: Some(1_700_003_600),
            },
            exchange_fails: false,
            verify_fails: false,
            refresh: RefreshBehaviour::Reject,
            revocation: Some(RevocationOutcome::Revoked),
            ready: true,
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            last_code_verifier: Mutex::new(None),
        }
    }
}

impl FakeProvider {
    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revocations(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, login: &LoginState) -> Result<String> {
        Ok(format!(
            "https://idp.example.com/auth?state={}&code_challenge={}",
            login.state,
            login.code_challenge()
        ))
    }

    async fn exchange_code(&self, _code: &str, code_verifier: Option<&str>) -> Result<TokenSet> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code_verifier.lock().unwrap() = code_verifier.map(str::to_string);
        if self.exchange_fails {
            return Err(RelayError::TokenExchangeFailed("provider returned 400".to_string()));
        }
        Ok(self.tokens.clone())
    }

    async fn verify_identity_token(&self, _raw_id_token: &str) -> Result<IdentityClaims> {
        if self.verify_fails {
            return Err(oidc_relay::error::VerificationError::SignatureInvalid.into());
        }
        Ok(user())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.refresh {
            RefreshBehaviour::Issue(tokens) => Ok(tokens.clone()),
            RefreshBehaviour::Reject => Err(RelayError::RefreshRejected("invalid_grant".to_string())),
            RefreshBehaviour::Unreachable => {
                Err(RelayError::ProviderUnreachable("connection refused".to_string()))
            }
        }
    }

    async fn revoke_token(&self, _token: &str) -> Result<RevocationOutcome> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revocation
            .ok_or_else(|| RelayError::ProviderUnreachable("connection refused".to_string()))
    }

    async fn check_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(RelayError::ProviderUnreachable("discovery failed".to_string()))
        }
    }
}

/// Router backed by `provider`
pub fn build_app(provider: Arc<FakeProvider>, require_state: bool) -> axum::Router {
    let state = AppState {
        provider,
        frontend_redirect_url: FRONTEND_URL.to_string(),
        require_state,
        secure_cookies: false,
    };
    router(state, Duration::from_secs(5))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn response_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
