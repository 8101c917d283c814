//! Identity provider capability
//!
//! The flows only talk to the provider through this trait, so they can be driven
//! by the real [`OidcClient`](super::OidcClient) or by a fake in tests.

use super::login::LoginState;
use super::token::TokenSet;
use super::verify::IdentityClaims;
use crate::error::Result;
use async_trait::async_trait;

/// What the provider said about a revocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    Revoked,
    Rejected { status: u16 },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL for a relay-initiated login
    fn authorization_url(&self, login: &LoginState) -> Result<String>;

    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> Result<TokenSet>;

    /// Verify a raw ID token and extract the identity claims
    async fn verify_identity_token(&self, raw_id_token: &str) -> Result<IdentityClaims>;

    /// Redeem a refresh token at the token endpoint
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Send a revocation request; `Err` only when the request could not be sent
    async fn revoke_token(&self, token: &str) -> Result<RevocationOutcome>;

    /// Check that provider metadata can be resolved
    async fn check_ready(&self) -> Result<()>;
}
