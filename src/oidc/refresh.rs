//! Refresh token redemption

use super::provider::IdentityProvider;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute Unix timestamp; 0 when the provider gave no lifetime
    pub expires_in: i64,
}

/// Exchange a refresh token for a new access token.
///
/// The returned refresh token may be rotated; when the provider does not issue
/// a new one the presented token stays valid and is returned as is.
pub async fn refresh_tokens(
    provider: &dyn IdentityProvider,
    refresh_token: &str,
) -> Result<RefreshResponse> {
    if refresh_token.is_empty() {
        return Err(RelayError::MissingRefreshToken);
    }

    tracing::info!(refresh_token_len = refresh_token.len(), "Refreshing tokens");

    let tokens = provider.refresh_token(refresh_token).await?;
    let rotated = tokens.refresh_token.is_some();

    tracing::info!(
        access_token_len = tokens.access_token.len(),
        rotated,
        "Token refresh succeeded"
    );

    Ok(RefreshResponse {
        expires_in: tokens.expires_at_or_zero(),
        refresh_token: tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string()),
        access_token: tokens.access_token,
    })
}
