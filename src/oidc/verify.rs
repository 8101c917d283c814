//! ID token verification
//!
//! Checks an identity token against the provider's published keys: signature,
//! issuer, audience, `exp` and `nbf`. Failures are reported as a
//! [`VerificationError`] naming the check that failed, never the token itself.

use super::jwks::{JwksCache, SigningKey};
use crate::error::VerificationError;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, decode_header, get_current_timestamp, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identity of the authenticated user, as sent to the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    exp: u64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<RawClaims> for IdentityClaims {
    fn from(raw: RawClaims) -> Self {
        IdentityClaims {
            sub: raw.sub,
            email: raw.email.unwrap_or_default(),
            name: raw.name.unwrap_or_default(),
        }
    }
}

pub struct IdTokenVerifier {
    issuer: String,
    client_id: String,
    clock_skew_secs: u64,
    algorithms: Vec<Algorithm>,
    jwks: JwksCache,
}

impl IdTokenVerifier {
    /// `supported_algs` comes from the discovery document; RS256 when empty
    pub fn new(
        issuer: String,
        client_id: String,
        clock_skew_secs: u64,
        supported_algs: &[String],
        jwks: JwksCache,
    ) -> Self {
        let mut algorithms: Vec<Algorithm> = supported_algs
            .iter()
            .filter_map(|name| Algorithm::from_str(name).ok())
            .filter(|alg| !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .collect();
        if algorithms.is_empty() {
            algorithms.push(Algorithm::RS256);
        }

        Self {
            issuer,
            client_id,
            clock_skew_secs,
            algorithms,
            jwks,
        }
    }

    /// Verify a raw ID token and extract the identity claims
    pub async fn verify(&self, raw_token: &str) -> Result<IdentityClaims, VerificationError> {
        let header = decode_header(raw_token).map_err(map_jwt_error)?;

        if !self.algorithms.contains(&header.alg) {
            return Err(VerificationError::UnsupportedAlgorithm(format!(
                "{:?}",
                header.alg
            )));
        }

        let candidates = self.jwks.resolve(header.kid.as_deref(), header.alg).await?;

        let mut last_error = VerificationError::SignatureInvalid;
        for key in &candidates {
            match self.verify_with_key(raw_token, key) {
                Ok(claims) => return Ok(claims),
                // Another key without a kid may still match
                Err(VerificationError::SignatureInvalid) => {
                    last_error = VerificationError::SignatureInvalid;
                }
                Err(other) => return Err(other),
            }
        }

        Err(last_error)
    }

    fn verify_with_key(
        &self,
        raw_token: &str,
        key: &SigningKey,
    ) -> Result<IdentityClaims, VerificationError> {
        let mut validation = Validation::new(key.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.clock_skew_secs;

        let data = decode::<RawClaims>(raw_token, &key.key, &validation).map_err(map_jwt_error)?;

        // jsonwebtoken still accepts exp == now
        if data.claims.exp.saturating_add(self.clock_skew_secs) <= get_current_timestamp() {
            return Err(VerificationError::TokenExpired);
        }

        Ok(data.claims.into())
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerificationError {
    match err.kind() {
        JwtErrorKind::InvalidSignature => VerificationError::SignatureInvalid,
        JwtErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
        JwtErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
        JwtErrorKind::ExpiredSignature => VerificationError::TokenExpired,
        JwtErrorKind::ImmatureSignature => VerificationError::NotYetValid,
        JwtErrorKind::MissingRequiredClaim(claim) => {
            VerificationError::MissingClaim(claim.clone())
        }
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => {
            VerificationError::UnsupportedAlgorithm("algorithm does not match key".to_string())
        }
        JwtErrorKind::InvalidToken => {
            VerificationError::Malformed("not a compact JWS".to_string())
        }
        JwtErrorKind::Base64(_) => VerificationError::Malformed("invalid base64 segment".to_string()),
        // serde messages can quote claim values
        JwtErrorKind::Json(_) | JwtErrorKind::Utf8(_) => {
            VerificationError::Malformed("invalid claims encoding".to_string())
        }
        _ => VerificationError::Malformed("token rejected".to_string()),
    }
}
