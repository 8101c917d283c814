//! OIDC Relay Library
//!
//! Backend half of a browser single-page app's OpenID Connect login: exchanges
//! authorization codes, verifies ID tokens, refreshes and revokes tokens so the
//! client secret never reaches the browser.

pub mod config;
pub mod error;
pub mod middleware;
pub mod oidc;
pub mod server;
