use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engage_shared::errors::{AppError, AppResult, ErrorCode};
use engage_shared::types::auth::AuthUser;
use engage_shared::types::api::ApiResponse;

use crate::engine::EngageResponse;
use crate::models::EngagementType;
use crate::services::engagement_guard::EngagementOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordEngagementRequest {
    #[serde(rename = "type")]
    pub engagement_type: EngagementType,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

/// POST /posts/:post_id/engagements
pub async fn record_engagement(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(req): Json<RecordEngagementRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EngageResponse>>)> {
    let result = state.engine.engage(post_id, user.id, req.engagement_type).await?;

    match result.outcome {
        EngagementOutcome::Accepted { .. } => {
            Ok((StatusCode::CREATED, Json(ApiResponse::ok(EngageResponse::from(result)))))
        }
        EngagementOutcome::Duplicate => Err(AppError::new(
            ErrorCode::DuplicateEngagement,
            format!("already recorded a {} on this post", req.engagement_type),
        )),
        EngagementOutcome::RateLimited { retry_after_secs } => Err(AppError::with_details(
            ErrorCode::RateLimited,
            "too many engagements, slow down",
            serde_json::json!({ "retry_after_secs": retry_after_secs }),
        )),
    }
}

/// DELETE /posts/:post_id/engagements/:kind
pub async fn remove_engagement(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((post_id, kind)): Path<(Uuid, String)>,
) -> AppResult<Json<ApiResponse<RemovedResponse>>> {
    let kind: EngagementType = kind
        .parse()
        .map_err(AppError::Validation)?;

    if !state.engine.remove_engagement(post_id, user.id, kind).await? {
        return Err(AppError::new(ErrorCode::EngagementNotFound, "engagement not found"));
    }
    Ok(Json(ApiResponse::ok(RemovedResponse { removed: true })))
}
