//! Token responses and token sets
//!
//! Converts the provider's token endpoint response into a [`TokenSet`] with an
//! absolute expiry. Nothing here is ever written to disk or logged verbatim:
//! `Debug` output only shows lengths and presence flags.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// Token response from OIDC provider
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "expires_in_from_number_or_string")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Tokens issued by the provider for one exchange or refresh
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Unix timestamp when the access token expires
    pub expires_at: Option<i64>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `issued_at`
    pub fn from_response(response: TokenResponse, issued_at: i64) -> Self {
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            id_token: response.id_token.filter(|t| !t.is_empty()),
            // A lifetime that overflows the clock is treated as unknown
            expires_at: response
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(|secs| issued_at.checked_add(secs)),
        }
    }

    /// Expiry as sent to the frontend; 0 when the provider did not say
    pub fn expires_at_or_zero(&self) -> i64 {
        self.expires_at.unwrap_or(0)
    }
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        TokenSet::from_response(response, chrono::Utc::now().timestamp())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token_len", &self.access_token.len())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token_len", &self.access_token.len())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}

/// Some providers send `expires_in` as a quoted number.
fn expires_in_from_number_or_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ExpiresIn {
        Number(i64),
        Text(String),
    }

    match Option::<ExpiresIn>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ExpiresIn::Number(secs)) => Ok(Some(secs)),
        Some(ExpiresIn::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(ExpiresIn::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("invalid expires_in")),
    }
}
