//! Authorization code callback
//!
//! Completes the flow the provider redirected back to us: validates the callback
//! parameters, exchanges the code, verifies the ID token and builds the payload
//! that is handed to the frontend in the URL fragment.

use super::login::LoginState;
use super::provider::IdentityProvider;
use super::verify::IdentityClaims;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};

/// Query parameters of the provider's redirect
#[derive(Default, Deserialize)]
pub struct AuthorizationRequestParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Everything the frontend receives after a successful login
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Absolute Unix timestamp, despite the name
    pub expires_in: i64,
    pub user: IdentityClaims,
}

/// How strictly the callback's `state` is checked
#[derive(Debug, Clone, Copy)]
pub struct StatePolicy<'a> {
    /// Login state from the cookie set by `/api/auth/login`, if any
    pub login: Option<&'a LoginState>,
    /// Reject callbacks that carry no login cookie
    pub require_state: bool,
}

/// Run the authorization code exchange for one callback
pub async fn complete_authorization(
    provider: &dyn IdentityProvider,
    params: AuthorizationRequestParams,
    policy: StatePolicy<'_>,
) -> Result<TokenPayload> {
    // Check for errors first
    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        return Err(RelayError::AuthorizationDenied {
            error,
            description: params.error_description.filter(|d| !d.is_empty()),
        });
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(RelayError::MissingCode)?;
    let state = params.state.unwrap_or_default();

    tracing::info!(
        code_len = code.len(),
        has_state = !state.is_empty(),
        has_login_cookie = policy.login.is_some(),
        "Authorization callback received"
    );

    let code_verifier = match policy.login {
        Some(login) => {
            if !login.matches(&state) {
                return Err(RelayError::StateMismatch(
                    "callback state differs from login cookie".to_string(),
                ));
            }
            Some(login.code_verifier.as_str())
        }
        None if policy.require_state => {
            return Err(RelayError::StateMismatch(
                "callback without login cookie".to_string(),
            ));
        }
        None => {
            tracing::warn!("Callback state not verified: no login cookie present");
            None
        }
    };

    let tokens = provider.exchange_code(&code, code_verifier).await?;
    tracing::info!(
        access_token_len = tokens.access_token.len(),
        has_refresh_token = tokens.refresh_token.is_some(),
        has_id_token = tokens.id_token.is_some(),
        "Authorization code exchanged"
    );

    let id_token = tokens.id_token.clone().ok_or(RelayError::MissingIdentityToken)?;
    let user = provider.verify_identity_token(&id_token).await?;
    tracing::info!(sub_len = user.sub.len(), has_email = !user.email.is_empty(), "ID token verified");

    Ok(TokenPayload {
        expires_in: tokens.expires_at_or_zero(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token.unwrap_or_default(),
        id_token,
        user,
    })
}

/// Frontend URL carrying the payload in the `tokens` fragment parameter
pub fn frontend_redirect_url(frontend_url: &str, payload: &TokenPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    let encoded: String = url::form_urlencoded::byte_serialize(json.as_bytes()).collect();
    let base = frontend_url.split('#').next().unwrap_or(frontend_url);
    Ok(format!("{}#tokens={}", base, encoded))
}
