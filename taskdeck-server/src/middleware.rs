use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use cookie::{Cookie, SameSite};
use taskdeck_core::DomainError;

use crate::auth::{AuthState, AuthUser};
use crate::errors::{ApiError, ServerError, ServerResult};
use crate::AppState;

pub const SESSION_COOKIE: &str = "taskdeck_session";
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "x-xsrf-token";

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = credential_from_parts(&parts.method, &parts.headers)?;
        state.auth.authenticate(&token).await
    }
}

/// Picks the credential a request presents. A bearer header wins; otherwise the
/// session cookie is used, and state-changing methods must echo the CSRF cookie.
fn credential_from_parts(method: &Method, headers: &HeaderMap) -> ServerResult<String> {
    if let Some(token) = bearer_token(headers) {
        return Ok(token);
    }

    let session = cookie_value(headers, SESSION_COOKIE)
        .ok_or_else(|| DomainError::Authentication("no credential presented".into()))?;

    if !is_safe(method) {
        let expected = cookie_value(headers, XSRF_COOKIE);
        let presented = headers
            .get(XSRF_HEADER)
            .and_then(|value| value.to_str().ok());
        let matched = match (expected.as_deref(), presented) {
            (Some(expected), Some(presented)) => AuthState::tokens_match(expected, presented),
            _ => false,
        };
        if !matched {
            tracing::warn!(%method, "CSRF token mismatch");
            return Err(ApiError::forbidden("CSRF token mismatch.").into());
        }
    }

    Ok(session)
}

/// The bearer token or session cookie a request carries, without the CSRF
/// check. Only for revoking: a forged request can do no more than sign out.
pub fn presented_credential(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_value(headers, SESSION_COOKIE))
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// `Set-Cookie` value carrying the credential. Script cannot read it.
pub fn session_cookie(token: &str, secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
        .to_string()
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    cookie.make_removal();
    cookie.to_string()
}

/// The CSRF cookie is readable by script so the frontend can echo it.
pub fn xsrf_cookie(token: &str, secure: bool) -> String {
    Cookie::build((XSRF_COOKIE, token.to_string()))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
        .to_string()
}
