//! Error types for the OIDC relay
//!
//! Every failure a flow can report is a [`RelayError`]. The HTTP boundary turns it
//! into a status code plus a JSON body via [`IntoResponse`]; the body never names
//! which identity token check failed and never echoes token material.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Coarse failure classes shared by all flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed request fields.
    ClientInput,
    /// The provider explicitly rejected the request.
    UpstreamDenied,
    /// Network or protocol failure talking to the provider.
    UpstreamUnavailable,
    /// A cryptographic or claim check on an identity token failed.
    VerificationFailure,
    /// Anything else (configuration, serialization, I/O).
    Internal,
}

/// Reason an identity token was rejected.
///
/// Safe to log: no variant carries token contents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("no signing key found for kid {0}")]
    KeyNotFound(String),

    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("missing required claim: {0}")]
    MissingClaim(String),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Identity provider metadata invalid: {0}")]
    ProviderMetadataInvalid(String),

    #[error("Authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Missing authorization code")]
    MissingCode,

    #[error("State mismatch: {0}")]
    StateMismatch(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("No ID token in token response")]
    MissingIdentityToken,

    #[error("ID token verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Missing refresh_token")]
    MissingRefreshToken,

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// JSON error body returned to the caller.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::MissingCode
            | RelayError::StateMismatch(_)
            | RelayError::MissingRefreshToken
            | RelayError::MissingToken
            | RelayError::InvalidBody(_) => ErrorKind::ClientInput,
            RelayError::AuthorizationDenied { .. } | RelayError::RefreshRejected(_) => {
                ErrorKind::UpstreamDenied
            }
            RelayError::ProviderUnreachable(_)
            | RelayError::ProviderMetadataInvalid(_)
            | RelayError::TokenExchangeFailed(_)
            | RelayError::MissingIdentityToken => ErrorKind::UpstreamUnavailable,
            RelayError::Verification(_) => ErrorKind::VerificationFailure,
            RelayError::Config(_)
            | RelayError::Json(_)
            | RelayError::Yaml(_)
            | RelayError::Io(_)
            | RelayError::UrlParse(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RefreshRejected(_) => StatusCode::UNAUTHORIZED,
            RelayError::ProviderUnreachable(_) | RelayError::ProviderMetadataInvalid(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => match self.kind() {
                ErrorKind::ClientInput | ErrorKind::UpstreamDenied => StatusCode::BAD_REQUEST,
                ErrorKind::UpstreamUnavailable
                | ErrorKind::VerificationFailure
                | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Body shown to the caller. Upstream details stay in the logs.
    pub fn body(&self) -> ErrorBody {
        let (error, description) = match self {
            RelayError::AuthorizationDenied { error, description } => (
                error.clone(),
                Some(
                    description
                        .clone()
                        .unwrap_or_else(|| "No description provided".to_string()),
                ),
            ),
            RelayError::MissingCode => ("missing_code".to_string(), Some(self.to_string())),
            RelayError::StateMismatch(_) => (
                "state_mismatch".to_string(),
                Some("Login state did not match".to_string()),
            ),
            RelayError::MissingRefreshToken => {
                ("missing_refresh_token".to_string(), Some(self.to_string()))
            }
            RelayError::MissingToken => ("missing_token".to_string(), Some(self.to_string())),
            RelayError::InvalidBody(_) => (
                "invalid_request".to_string(),
                Some("Invalid JSON".to_string()),
            ),
            RelayError::RefreshRejected(_) => (
                "refresh_rejected".to_string(),
                Some("Refresh token was rejected; re-authenticate".to_string()),
            ),
            RelayError::TokenExchangeFailed(_) => (
                "token_exchange_failed".to_string(),
                Some("Authentication unavailable, try again".to_string()),
            ),
            RelayError::MissingIdentityToken => (
                "missing_id_token".to_string(),
                Some(self.to_string()),
            ),
            RelayError::Verification(_) => (
                "id_token_invalid".to_string(),
                Some("ID token verification failed".to_string()),
            ),
            RelayError::ProviderUnreachable(_) | RelayError::ProviderMetadataInvalid(_) => (
                "provider_unavailable".to_string(),
                Some("Identity provider unavailable, try again".to_string()),
            ),
            _ => ("internal_error".to_string(), None),
        };

        ErrorBody {
            error,
            error_description: description,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = ?self.kind(), status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(kind = ?self.kind(), status = status.as_u16(), "{}", self);
        }

        (status, Json(self.body())).into_response()
    }
}
