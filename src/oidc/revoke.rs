//! Best-effort token revocation
//!
//! The frontend drops its tokens no matter what the provider answers, so the
//! provider's verdict is only logged.

use super::provider::{IdentityProvider, RevocationOutcome};
use crate::error::{RelayError, Result};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Ask the provider to revoke `token`; only an empty token is an error
pub async fn revoke_token(provider: &dyn IdentityProvider, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(RelayError::MissingToken);
    }

    tracing::info!(token_len = token.len(), "Revoking token");

    match provider.revoke_token(token).await {
        Ok(RevocationOutcome::Revoked) => tracing::info!("Token revoked by provider"),
        Ok(RevocationOutcome::Rejected { status }) => {
            tracing::warn!(status, "Provider did not revoke token")
        }
        Err(e) => tracing::warn!(error = %e, "Revocation request failed"),
    }

    Ok(())
}
