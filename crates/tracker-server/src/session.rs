//! Cookie sessions
//!
//! The session token travels in the `sid` cookie and is looked up in the
//! `sessions` table on every authenticated request.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{HeaderMap, HeaderValue, COOKIE};
use axum::http::request::Parts;
use chrono::Duration;
use tracker_core::sync::SESSION_COOKIE;
use tracker_core::User;

use crate::error::ApiError;
use crate::AppState;

/// Session token from the request's `Cookie` header
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value opening a session
pub fn session_cookie(token: &str, ttl: Duration) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    ))
    .map_err(|e| ApiError::Internal(format!("Invalid session cookie: {e}")))
}

/// `Set-Cookie` value ending a session
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("sid=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

/// Authenticated caller, resolved from the session cookie
pub struct CurrentUser {
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(ApiError::not_authenticated)?;

        let user = state
            .db
            .run(move |db| db.session_user(&token))
            .await?
            .ok_or_else(ApiError::not_authenticated)?;

        Ok(Self { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_session_token() {
        assert_eq!(
            session_token(&headers("theme=dark; sid=abc-123")).as_deref(),
            Some("abc-123")
        );
        assert_eq!(session_token(&headers("sid=")), None);
        assert_eq!(session_token(&headers("other=1")), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let value = session_cookie("tok", Duration::days(7)).unwrap();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("sid=tok;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=Lax"));
        assert!(value.contains("Max-Age=604800"));
    }

    #[test]
    fn test_clear_cookie_expires() {
        assert!(clear_cookie().to_str().unwrap().contains("Max-Age=0"));
    }
}
