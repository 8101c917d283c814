//! OIDC relay flows and the provider client behind them

pub mod callback;
pub mod client;
pub mod discovery;
pub mod jwks;
pub mod login;
pub mod provider;
pub mod refresh;
pub mod revoke;
pub mod token;
pub mod verify;

pub use callback::{complete_authorization, AuthorizationRequestParams, StatePolicy, TokenPayload};
pub use client::{ClientConfiguration, OidcClient};
pub use discovery::ProviderMetadata;
pub use login::LoginState;
pub use provider::{IdentityProvider, RevocationOutcome};
pub use refresh::{refresh_tokens, RefreshResponse};
pub use revoke::revoke_token;
pub use token::{TokenResponse, TokenSet};
pub use verify::{IdTokenVerifier, IdentityClaims};
