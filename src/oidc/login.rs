//! Login state for relay-initiated authorization requests
//!
//! `/api/auth/login` generates a random `state` and a PKCE (RFC 7636) verifier,
//! hands both to the browser in an `HttpOnly` cookie and sends the user to the
//! provider. The callback compares the returned `state` with the cookie and
//! presents the verifier at the token endpoint. Nothing is stored server-side.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Cookie carrying the login state between the login redirect and the callback
pub const LOGIN_COOKIE: &str = "oidc_relay_login";

/// Cookie lifetime; an authorization round trip longer than this has to start over
const LOGIN_COOKIE_MAX_AGE_SECS: u64 = 600;

const STATE_LEN: usize = 32;
const VERIFIER_LEN: usize = 64;

/// State and PKCE verifier for one authorization request
#[derive(Clone, PartialEq, Eq)]
pub struct LoginState {
    pub state: String,
    pub code_verifier: String,
}

impl LoginState {
    /// Generate a fresh state and PKCE verifier
    pub fn generate() -> Self {
        LoginState {
            state: random_alphanumeric(STATE_LEN),
            code_verifier: random_alphanumeric(VERIFIER_LEN),
        }
    }

    /// PKCE code challenge: BASE64URL(SHA256(code_verifier))
    pub fn code_challenge(&self) -> String {
        let hash = Sha256::digest(self.code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// `Set-Cookie` value storing this state
    pub fn to_set_cookie(&self, secure: bool) -> String {
        let mut cookie = format!(
            "{}={}.{}; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age={}",
            LOGIN_COOKIE, self.state, self.code_verifier, LOGIN_COOKIE_MAX_AGE_SECS
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the login cookie
    pub fn clear_cookie(secure: bool) -> String {
        let mut cookie = format!(
            "{}=; Path=/api/auth; HttpOnly; SameSite=Lax; Max-Age=0",
            LOGIN_COOKIE
        );
        if secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Find the login cookie in a `Cookie` request header
    pub fn from_cookie_header(header: &str) -> Option<Self> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == LOGIN_COOKIE)
            .and_then(|(_, value)| Self::parse(value))
    }

    fn parse(value: &str) -> Option<Self> {
        let (state, code_verifier) = value.split_once('.')?;
        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(state) || !valid(code_verifier) {
            return None;
        }
        Some(LoginState {
            state: state.to_string(),
            code_verifier: code_verifier.to_string(),
        })
    }

    /// Compare the callback's `state` without short-circuiting on the first difference
    pub fn matches(&self, returned_state: &str) -> bool {
        let expected = self.state.as_bytes();
        let actual = returned_state.as_bytes();
        if expected.len() != actual.len() {
            return false;
        }
        expected
            .iter()
            .zip(actual)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for LoginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginState")
            .field("state_len", &self.state.len())
            .field("code_verifier_len", &self.code_verifier.len())
            .finish()
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation() {
        let login = LoginState::generate();
        assert_eq!(login.state.len(), 32);
        assert_eq!(login.code_verifier.len(), 64);

        // SHA256 hash encoded in base64url is 43 chars
        let challenge = login.code_challenge();
        assert_eq!(challenge.len(), 43);
        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        assert!(!challenge.contains('='));
    }

    #[test]
    fn test_uniqueness() {
        let a = LoginState::generate();
        let b = LoginState::generate();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn test_challenge_matches_rfc7636_example() {
        // RFC 7636 appendix B
        let login = LoginState {
            state: "xyz".to_string(),
            code_verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
        };
        assert_eq!(
            login.code_challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_cookie_round_trip_through_header() {
        let login = LoginState::generate();
        let set_cookie = login.to_set_cookie(true);
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.ends_with("; Secure"));

        let value = set_cookie.split(';').next().unwrap();
        let header = format!("theme=dark; {}; other=1", value);
        assert_eq!(LoginState::from_cookie_header(&header), Some(login));
    }

    #[test]
    fn test_rejects_malformed_cookie() {
        assert_eq!(LoginState::from_cookie_header("oidc_relay_login="), None);
        assert_eq!(LoginState::from_cookie_header("oidc_relay_login=abc"), None);
        assert_eq!(LoginState::from_cookie_header("oidc_relay_login=a b.c"), None);
        assert_eq!(LoginState::from_cookie_header("session=abc.def"), None);
    }

    #[test]
    fn test_state_matching() {
        let login = LoginState {
            state: "abc123".to_string(),
            code_verifier: "v".to_string(),
        };
        assert!(login.matches("abc123"));
        assert!(!login.matches("abc124"));
        assert!(!login.matches("abc"));
        assert!(!login.matches(""));
    }
}
