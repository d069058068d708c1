//! Account and session routes

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;
use tracker_core::sync::{Credentials, MessageResponse, UserResponse};
use tracker_core::User;

use crate::db::DbError;
use crate::error::{ApiError, ApiResult};
use crate::password::{
    hash_password_blocking, verify_decoy_blocking, verify_password_blocking,
};
use crate::session::{clear_cookie, session_cookie, session_token, CurrentUser};
use crate::AppState;

const INVALID_LOGIN: &str = "Invalid username or password";

fn require_credentials(credentials: &Credentials) -> ApiResult<()> {
    if credentials.is_complete() {
        Ok(())
    } else {
        Err(ApiError::bad_request("Username and password are required"))
    }
}

/// Open a session for `user` and answer with its cookie
async fn start_session(state: &AppState, user: User, message: &str) -> ApiResult<Response> {
    let ttl = state.session_ttl;
    let user_id = user.id;
    let token = state
        .db
        .run(move |db| db.create_session(user_id, ttl))
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, session_cookie(&token, ttl)?);

    let body = UserResponse {
        user,
        message: Some(message.to_string()),
    };
    Ok((headers, Json(body)).into_response())
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Response> {
    require_credentials(&credentials)?;
    let username = credentials.username.trim().to_string();

    let hash = hash_password_blocking(credentials.password).await?;
    let user = state
        .db
        .run(move |db| db.create_user(&username, &hash))
        .await
        .map_err(|e| match e {
            DbError::DuplicateUsername => ApiError::bad_request("Username already exists"),
            other => other.into(),
        })?;

    info!("Created account {}", user.username);
    start_session(&state, user, "Account created successfully").await
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Response> {
    require_credentials(&credentials)?;
    let username = credentials.username.trim().to_string();

    let found = state
        .db
        .run(move |db| db.find_user(&username))
        .await?;
    let Some((user, hash)) = found else {
        verify_decoy_blocking(credentials.password).await;
        return Err(ApiError::Unauthorized(INVALID_LOGIN.to_string()));
    };

    if !verify_password_blocking(credentials.password, hash).await? {
        return Err(ApiError::Unauthorized(INVALID_LOGIN.to_string()));
    }

    start_session(&state, user, "Login successful").await
}

/// POST /api/auth/logout
///
/// Succeeds without a session too; the cookie is cleared either way.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.db.run(move |db| db.delete_session(&token)).await?;
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear_cookie());
    let body = MessageResponse {
        message: "Logout successful".to_string(),
    };
    Ok((response_headers, Json(body)).into_response())
}

/// GET /api/auth/me
pub async fn me(current: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse {
        user: current.user,
        message: None,
    })
}
