//! Confidence data routes

use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use tracing::debug;
use tracker_core::sync::{MessageResponse, UpdateRequest, UpdateResponse};
use tracker_core::ConfidenceMap;

use crate::error::{ApiError, ApiResult};
use crate::session::CurrentUser;
use crate::AppState;

const INVALID_DATA: &str = "Invalid confidence data";

/// GET /api/confidence
pub async fn get_confidence(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<ConfidenceMap>> {
    let user_id = current.user.id;
    let map = state.db.run(move |db| db.confidence_map(user_id)).await?;
    Ok(Json(map))
}

/// POST /api/confidence/sync
///
/// Upserts every entry of `confidenceData` in one transaction. Entries the
/// body does not mention are kept.
pub async fn sync_confidence(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<Value>,
) -> ApiResult<Json<MessageResponse>> {
    let map = parse_confidence_data(&body)?;
    let user_id = current.user.id;

    let count = state
        .db
        .run(move |db| db.upsert_confidence(user_id, &map))
        .await?;
    debug!("Synced {} entries for {}", count, current.user.username);

    Ok(Json(MessageResponse {
        message: "Confidence data synced successfully".to_string(),
    }))
}

/// PUT /api/confidence/:problem_id
pub async fn update_confidence(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(problem_id): Path<String>,
    Json(body): Json<UpdateRequest>,
) -> ApiResult<Json<UpdateResponse>> {
    let level = body
        .confidence_level
        .filter(|level| !level.is_empty())
        .ok_or_else(|| ApiError::bad_request("Confidence level is required"))?;

    let user_id = current.user.id;
    let entry = state
        .db
        .run(move |db| {
            db.upsert_entry(
                user_id,
                &problem_id,
                &level,
                body.sheet_name.as_deref(),
                body.problem_title.as_deref(),
            )
        })
        .await?;

    Ok(Json(UpdateResponse { confidence: entry }))
}

/// Validate `{"confidenceData": {key: level}}`
///
/// Scalar levels are stored as their string form; anything else rejects the
/// whole body before a single row is written.
fn parse_confidence_data(body: &Value) -> ApiResult<ConfidenceMap> {
    let data = body
        .get("confidenceData")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::bad_request(INVALID_DATA))?;

    data.iter()
        .map(|(key, value)| {
            let level = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(ApiError::bad_request(INVALID_DATA)),
            };
            Ok((key.clone(), level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_confidence_data() {
        let map = parse_confidence_data(&json!({
            "confidenceData": {"p1": "low", "p2": 3}
        }))
        .unwrap();
        assert_eq!(map.get("p1").unwrap(), "low");
        assert_eq!(map.get("p2").unwrap(), "3");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for body in [
            json!({}),
            json!({"confidenceData": null}),
            json!({"confidenceData": ["low"]}),
            json!({"confidenceData": {"p1": {"nested": true}}}),
        ] {
            assert!(parse_confidence_data(&body).is_err(), "accepted {}", body);
        }
    }

    #[test]
    fn test_empty_map_is_valid() {
        assert!(parse_confidence_data(&json!({"confidenceData": {}}))
            .unwrap()
            .is_empty());
    }
}
