use super::AppState;
use crate::error::{RelayError, Result};
use crate::oidc::callback::frontend_redirect_url;
use crate::oidc::refresh::RefreshRequest;
use crate::oidc::revoke::RevokeRequest;
use crate::oidc::{
    complete_authorization, refresh_tokens, revoke_token, AuthorizationRequestParams, LoginState,
    StatePolicy,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// 302 to `location`, optionally setting a cookie
fn found(location: &str, set_cookie: Option<String>) -> Result<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| RelayError::Config(format!("Invalid redirect location: {}", e)))?;

    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    if let Some(cookie) = set_cookie {
        let cookie = HeaderValue::from_str(&cookie)
            .map_err(|e| RelayError::Config(format!("Invalid cookie: {}", e)))?;
        headers.insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

fn login_cookie(headers: &HeaderMap) -> Option<LoginState> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(LoginState::from_cookie_header)
}

/// Parse a JSON body whatever its Content-Type says.
///
/// Only the position of a syntax error is reported; serde's messages can quote
/// the offending input.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        RelayError::InvalidBody(format!(
            "{:?} error at line {} column {}",
            e.classify(),
            e.line(),
            e.column()
        ))
    })
}

/// GET /api/auth/login
pub async fn login(State(state): State<AppState>) -> Result<Response> {
    let login = LoginState::generate();
    let url = state.provider.authorization_url(&login)?;
    tracing::info!("Redirecting browser to identity provider");
    found(&url, Some(login.to_set_cookie(state.secure_cookies)))
}

/// GET /api/auth/callback
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<AuthorizationRequestParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let login = login_cookie(&headers);
    let policy = StatePolicy {
        login: login.as_ref(),
        require_state: state.require_state,
    };

    let payload = complete_authorization(state.provider.as_ref(), params, policy).await?;
    let location = frontend_redirect_url(&state.frontend_redirect_url, &payload)?;

    tracing::info!("Login complete, redirecting to frontend");
    found(&location, Some(LoginState::clear_cookie(state.secure_cookies)))
}

/// POST /api/auth/refresh
pub async fn refresh(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request: RefreshRequest = parse_body(&body)?;
    let refresh_token = request.refresh_token.unwrap_or_default();
    let tokens = refresh_tokens(state.provider.as_ref(), &refresh_token).await?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(tokens)).into_response())
}

/// POST /api/auth/revoke
pub async fn revoke(State(state): State<AppState>, body: Bytes) -> Result<Json<serde_json::Value>> {
    let request: RevokeRequest = parse_body(&body)?;
    let token = request.token.unwrap_or_default();
    revoke_token(state.provider.as_ref(), &token).await?;
    Ok(Json(json!({ "status": "revoked" })))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /ready
pub async fn ready(State(state): State<AppState>) -> Response {
    match state.provider.check_ready().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not ready" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_cookie_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("a=1; oidc_relay_login=abc.def123; b=2"),
        );
        let login = login_cookie(&headers).unwrap();
        assert_eq!(login.state, "abc");
        assert_eq!(login.code_verifier, "def123");
    }

    #[test]
    fn test_parse_body_hides_input() {
        let body = Bytes::from_static(br#"{"refresh_token": "secret-value""#);
        let err = parse_body::<RefreshRequest>(&body).unwrap_err();
        assert!(matches!(err, RelayError::InvalidBody(_)));
        assert!(!err.to_string().contains("secret-value"));
    }

    #[test]
    fn test_found_sets_location_and_cookie() {
        let response = found("https://idp.example.com/auth?x=1", Some("c=v".to_string())).unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://idp.example.com/auth?x=1"
        );
        assert_eq!(response.headers()[header::SET_COOKIE], "c=v");
    }
}
