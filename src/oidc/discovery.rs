//! OIDC provider discovery
//!
//! Fetches provider metadata from /.well-known/openid-configuration

use crate::error::{RelayError, Result};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

/// Path appended to the issuer when the provider does not advertise a revocation endpoint.
const DERIVED_REVOCATION_PATH: &str = "/token/revoke";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    #[serde(default)]
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: String,
    #[serde(default)]
    pub jwks_uri: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Discover provider metadata from issuer URL
    pub async fn discover(http: &ClientWithMiddleware, issuer_url: &str) -> Result<Self> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer_url.trim_end_matches('/')
        );

        let response = http.get(&discovery_url).send().await.map_err(|e| {
            RelayError::ProviderUnreachable(format!("Failed to fetch OIDC configuration: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(RelayError::ProviderUnreachable(format!(
                "OIDC discovery request failed with status: {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            RelayError::ProviderUnreachable(format!("Failed to read OIDC configuration: {}", e))
        })?;

        let metadata: ProviderMetadata = serde_json::from_str(&body).map_err(|e| {
            RelayError::ProviderMetadataInvalid(format!(
                "Failed to parse OIDC configuration: {}",
                e
            ))
        })?;

        metadata.validate(issuer_url)?;
        Ok(metadata)
    }

    fn validate(&self, issuer_url: &str) -> Result<()> {
        if self.issuer != issuer_url {
            return Err(RelayError::ProviderMetadataInvalid(format!(
                "Issuer mismatch: configured {}, provider reports {}",
                issuer_url, self.issuer
            )));
        }

        // Validate required endpoints
        for (name, value) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ] {
            if value.is_empty() {
                return Err(RelayError::ProviderMetadataInvalid(format!(
                    "OIDC configuration missing {}",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Revocation endpoint: discovered if advertised, otherwise derived from the issuer
    pub fn revocation_endpoint(&self) -> String {
        match self.revocation_endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => endpoint.to_string(),
            _ => format!(
                "{}{}",
                self.issuer.trim_end_matches('/'),
                DERIVED_REVOCATION_PATH
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(revocation: Option<&str>) -> ProviderMetadata {
        ProviderMetadata {
            issuer: "https://dex.example.com".to_string(),
            authorization_endpoint: "https://dex.example.com/auth".to_string(),
            token_endpoint: "https://dex.example.com/token".to_string(),
            jwks_uri: "https://dex.example.com/keys".to_string(),
            revocation_endpoint: revocation.map(String::from),
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        }
    }

    #[test]
    fn test_revocation_endpoint_prefers_discovered() {
        let m = metadata(Some("https://dex.example.com/oauth2/revoke"));
        assert_eq!(m.revocation_endpoint(), "https://dex.example.com/oauth2/revoke");
    }

    #[test]
    fn test_revocation_endpoint_falls_back_to_issuer() {
        assert_eq!(
            metadata(None).revocation_endpoint(),
            "https://dex.example.com/token/revoke"
        );
        assert_eq!(
            metadata(Some("")).revocation_endpoint(),
            "https://dex.example.com/token/revoke"
        );
    }

    #[test]
    fn test_validate_accepts_exact_issuer() {
        assert!(metadata(None).validate("https://dex.example.com").is_ok());
    }

    #[test]
    fn test_validate_rejects_trailing_slash_difference() {
        let result = metadata(None).validate("https://dex.example.com/");
        assert!(matches!(result, Err(RelayError::ProviderMetadataInvalid(_))));
    }

    #[test]
    fn test_validate_rejects_foreign_issuer() {
        let result = metadata(None).validate("https://other.example.com");
        assert!(matches!(result, Err(RelayError::ProviderMetadataInvalid(_))));
    }

    #[test]
    fn test_validate_requires_jwks_uri() {
        let mut m = metadata(None);
        m.jwks_uri.clear();
        let result = m.validate("https://dex.example.com");
        assert!(matches!(result, Err(RelayError::ProviderMetadataInvalid(msg)) if msg.contains("jwks_uri")));
    }
}
