//! HTTP routes

pub mod auth;
pub mod confidence;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracker_core::stats::{aggregate_levels, ConfidenceStats};

use crate::error::ApiResult;
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Confidence tracker API is running",
    })
}

/// GET /api/stats
///
/// Levels outside the known set count toward `total` only.
pub async fn stats(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<ConfidenceStats>> {
    let user_id = current.user.id;
    let levels = state
        .db
        .run(move |db| db.confidence_levels(user_id))
        .await?;
    Ok(Json(aggregate_levels(levels.iter().map(String::as_str))))
}
