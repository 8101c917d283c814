//! Signing key cache
//!
//! Keys are fetched from the provider's `jwks_uri` on first use and kept until a
//! token names a key id we have not seen. Refreshes are rate-limited so a stream
//! of tokens with bogus `kid`s cannot turn into a stream of JWKS requests.

use crate::error::VerificationError;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Minimum interval between JWKS refreshes (5 minutes).
const JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Longest `kid` prefix carried into errors and logs.
const MAX_LOGGED_KID_CHARS: usize = 64;

#[derive(Debug, Deserialize)]
struct JwkEntry {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    // RSA fields
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    // EC fields
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

/// A verification key published by the provider.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: Option<String>,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

#[derive(Default)]
struct CacheState {
    keys: Vec<SigningKey>,
    last_refresh: Option<Instant>,
}

/// Caches the provider's published signing keys.
pub struct JwksCache {
    jwks_uri: String,
    http: ClientWithMiddleware,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl JwksCache {
    pub fn new(jwks_uri: String, http: ClientWithMiddleware) -> Self {
        Self {
            jwks_uri,
            http,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Cache pre-loaded with keys; never fetches.
    #[cfg(test)]
    pub fn with_keys(keys: Vec<SigningKey>) -> Self {
        Self {
            jwks_uri: String::new(),
            http: reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build(),
            state: RwLock::new(CacheState {
                keys,
                last_refresh: Some(Instant::now()),
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Keys that may have signed a token with the given header.
    ///
    /// With a `kid`, returns the single matching key, refreshing once if it is
    /// unknown. Without one, returns every key of the header's algorithm.
    pub async fn resolve(
        &self,
        kid: Option<&str>,
        algorithm: Algorithm,
    ) -> Result<Vec<SigningKey>, VerificationError> {
        if let Some(found) = self.lookup(kid, algorithm).await {
            return Ok(found);
        }

        self.refresh().await?;

        match self.lookup(kid, algorithm).await {
            Some(found) => Ok(found),
            None => Err(VerificationError::KeyNotFound(
                kid.map_or_else(|| "<none>".to_string(), loggable_kid),
            )),
        }
    }

    async fn lookup(&self, kid: Option<&str>, algorithm: Algorithm) -> Option<Vec<SigningKey>> {
        let state = self.state.read().await;
        let found: Vec<SigningKey> = match kid {
            Some(kid) => state
                .keys
                .iter()
                .filter(|k| k.kid.as_deref() == Some(kid))
                .cloned()
                .collect(),
            None => state
                .keys
                .iter()
                .filter(|k| k.algorithm == algorithm)
                .cloned()
                .collect(),
        };

        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }

    /// Fetch the JWKS document and replace the cache. Rate-limited.
    async fn refresh(&self) -> Result<(), VerificationError> {
        // Concurrent misses wait here and then see the fresh timestamp
        let _refreshing = self.refresh_lock.lock().await;
        {
            let state = self.state.read().await;
            if let Some(last) = state.last_refresh {
                if last.elapsed() < JWKS_REFRESH_INTERVAL {
                    return Ok(());
                }
            }
        }

        tracing::debug!(jwks_uri = %self.jwks_uri, "Fetching provider signing keys");

        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| VerificationError::KeySetUnavailable(format!("fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VerificationError::KeySetUnavailable(format!(
                "JWKS fetch returned HTTP {}",
                response.status()
            )));
        }

        let doc: JwksDocument = response
            .json()
            .await
            .map_err(|e| VerificationError::KeySetUnavailable(format!("invalid JWKS: {}", e)))?;

        let keys = parse_keys(&doc);
        tracing::debug!(key_count = keys.len(), "Provider signing keys loaded");

        let mut state = self.state.write().await;
        state.keys = keys;
        state.last_refresh = Some(Instant::now());
        Ok(())
    }
}

/// `kid` comes from an unauthenticated header; bound what reaches the logs
fn loggable_kid(kid: &str) -> String {
    let char_count = kid.chars().count();
    if char_count <= MAX_LOGGED_KID_CHARS {
        return kid.to_string();
    }
    let prefix: String = kid.chars().take(MAX_LOGGED_KID_CHARS).collect();
    format!("{}... ({} chars)", prefix, char_count)
}

fn parse_keys(doc: &JwksDocument) -> Vec<SigningKey> {
    let mut keys = Vec::new();
    for jwk in &doc.keys {
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }

        let decoding_key = match jwk.kty.as_str() {
            "RSA" => match (jwk.n.as_deref(), jwk.e.as_deref()) {
                (Some(n), Some(e)) if !n.is_empty() && !e.is_empty() => {
                    DecodingKey::from_rsa_components(n, e)
                }
                _ => continue,
            },
            "EC" => match (jwk.x.as_deref(), jwk.y.as_deref()) {
                (Some(x), Some(y)) if !x.is_empty() && !y.is_empty() => {
                    DecodingKey::from_ec_components(x, y)
                }
                _ => continue,
            },
            _ => continue,
        };

        let decoding_key = match decoding_key {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(kid = ?jwk.kid, error = %e, "Skipping unusable JWK");
                continue;
            }
        };

        let Some(algorithm) = jwk_algorithm(jwk) else {
            continue;
        };

        keys.push(SigningKey {
            kid: jwk.kid.clone(),
            algorithm,
            key: decoding_key,
        });
    }
    keys
}

/// Determine the JWT algorithm for a JWK entry.
fn jwk_algorithm(jwk: &JwkEntry) -> Option<Algorithm> {
    if let Some(alg) = &jwk.alg {
        return match (jwk.kty.as_str(), alg.as_str()) {
            ("RSA", "RS256") => Some(Algorithm::RS256),
            ("RSA", "RS384") => Some(Algorithm::RS384),
            ("RSA", "RS512") => Some(Algorithm::RS512),
            ("RSA", "PS256") => Some(Algorithm::PS256),
            ("RSA", "PS384") => Some(Algorithm::PS384),
            ("RSA", "PS512") => Some(Algorithm::PS512),
            ("EC", "ES256") => Some(Algorithm::ES256),
            ("EC", "ES384") => Some(Algorithm::ES384),
            _ => None,
        };
    }

    // Default based on key type.
    match jwk.kty.as_str() {
        "EC" => match jwk.crv.as_deref() {
            Some("P-384") => Some(Algorithm::ES384),
            _ => Some(Algorithm::ES256),
        },
        _ => Some(Algorithm::RS256),
    }
}
