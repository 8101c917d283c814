//! Configuration parsing and validation
//!
//! The command line selects a YAML configuration file and a few runtime overrides.
//! The file describes this relay as an OAuth client of a single identity provider.

use crate::error::{RelayError, Result};
use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::path::Path;

const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "oidc-relay",
    version,
    about = "OIDC authorization code relay for single-page applications",
    long_about = "Backend relay that completes the OIDC authorization code flow on behalf of a browser app, verifies the ID token and hands the tokens to the frontend"
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, env = "RELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Override the listen port from the configuration file
    #[arg(long, env = "RELAY_PORT")]
    pub port: Option<u16>,

    /// Show only error messages
    #[arg(long, conflicts_with = "debug")]
    pub silent: bool,

    /// Enable debug logging
    #[arg(long, env = "RELAY_DEBUG")]
    pub debug: bool,
}

impl Cli {
    /// Parse configuration from CLI arguments and environment variables
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get log level based on flags
    pub fn log_level(&self) -> tracing::Level {
        if self.silent {
            tracing::Level::ERROR
        } else if self.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub oidc: OidcSettings,
    pub frontend: FrontendConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    /// Deadline for a whole inbound request, outbound provider calls included
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long a successful readiness probe may be reused (0 = always re-resolve)
    #[serde(default)]
    pub readiness_cache_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            readiness_cache_secs: 0,
        }
    }
}

/// How the relay authenticates to the token and revocation endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAuthMethod {
    #[default]
    ClientSecretBasic,
    ClientSecretPost,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcSettings {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub token_auth_method: TokenAuthMethod,
    #[serde(default)]
    pub clock_skew_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Reject callbacks that were not started through `/api/auth/login`
    #[serde(default)]
    pub require_state: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    pub redirect_url: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

/// Accept `port: 8000` as well as `port: "8000"`.
fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {text}"))),
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply command line overrides
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.oidc.issuer.is_empty() {
            return Err(RelayError::Config("OIDC issuer URL is required".to_string()));
        }

        if self.oidc.client_id.is_empty() {
            return Err(RelayError::Config("OIDC client ID is required".to_string()));
        }

        if self.oidc.client_secret.is_empty() {
            return Err(RelayError::Config(
                "OIDC client secret is required".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(RelayError::Config("Server port must be non-zero".to_string()));
        }

        // Validate URLs
        url::Url::parse(&self.oidc.issuer)
            .map_err(|e| RelayError::Config(format!("Invalid OIDC issuer URL: {}", e)))?;

        url::Url::parse(&self.oidc.redirect_uri)
            .map_err(|e| RelayError::Config(format!("Invalid redirect URI: {}", e)))?;

        url::Url::parse(&self.frontend.redirect_url)
            .map_err(|e| RelayError::Config(format!("Invalid frontend redirect URL: {}", e)))?;

        Ok(())
    }

    /// Get OAuth scopes (with defaults)
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = if self.oidc.scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            self.oidc.scopes.clone()
        };

        // Ensure "openid" scope is always included
        if !scopes.iter().any(|s| s == "openid") {
            scopes.insert(0, "openid".to_string());
        }

        scopes
    }

    /// Socket address string the server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  port: "8000"
oidc:
  issuer: https://dex.example.com
  clientId: spa-relay
  clientSecret: s3cret
  redirectUri: http://localhost:8000/api/auth/callback
  scopes:
    - profile
    - email
    - offline_access
frontend:
  redirectUrl: http://localhost:3000/auth/callback
"#;

    #[test]
    fn test_parses_original_layout() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.oidc.client_id, "spa-relay");
        assert_eq!(config.oidc.token_auth_method, TokenAuthMethod::ClientSecretBasic);
        assert!(!config.oidc.require_state);
        assert_eq!(config.frontend.redirect_url, "http://localhost:3000/auth/callback");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_port_and_options() {
        let yaml = SAMPLE
            .replace("port: \"8000\"", "port: 9090\n  readinessCacheSecs: 5")
            .replace(
                "clientSecret: s3cret",
                "clientSecret: s3cret\n  tokenAuthMethod: client_secret_post\n  requireState: true",
            );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.readiness_cache_secs, 5);
        assert_eq!(config.oidc.token_auth_method, TokenAuthMethod::ClientSecretPost);
        assert!(config.oidc.require_state);
        assert_eq!(config.listen_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn test_scopes_ensures_openid() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let scopes = config.scopes();
        assert_eq!(scopes[0], "openid");
        assert!(scopes.contains(&"offline_access".to_string()));
    }

    #[test]
    fn test_scopes_with_default() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.oidc.scopes.clear();
        assert_eq!(config.scopes(), vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.oidc.client_secret.clear();
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.frontend.redirect_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_oidc_section_fails() {
        let result = Config::from_yaml("server:\n  port: 8000\n");
        assert!(matches!(result, Err(RelayError::Yaml(_))));
    }

    #[test]
    fn test_cli_port_override() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        let cli = Cli::parse_from(["oidc-relay", "--port", "7000"]);
        config.apply_cli(&cli);
        assert_eq!(config.server.port, 7000);
        assert_eq!(cli.log_level(), tracing::Level::INFO);
    }
}
