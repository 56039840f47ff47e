use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use engage_shared::errors::{AppError, AppResult, ErrorCode};
use engage_shared::middleware::AdminUser;
use engage_shared::types::api::ApiResponse;
use engage_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{
    AdminAction, CreatorWarning, FlagStatus, FlaggedContent, NewAdminAction, User, WarningSummary,
};
use crate::services::flag_review::ReviewOutcome;
use crate::services::trust::IssuedWarning;
use crate::AppState;

// --- Request types ---

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewFlagRequest {
    /// CLEARED or CONFIRMED.
    pub decision: FlagStatus,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct IssueWarningRequest {
    #[validate(length(min = 1, max = 500, message = "reason must be 1-500 characters"))]
    pub reason: String,
}

// --- Flags ---

pub async fn list_pending_flags(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<FlaggedContent>>>> {
    Ok(Json(ApiResponse::ok(state.engine.pending_flags()?)))
}

pub async fn review_flag(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(post_id): Path<Uuid>,
    Json(body): Json<ReviewFlagRequest>,
) -> AppResult<Json<ApiResponse<ReviewOutcome>>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let outcome = state
        .engine
        .review_flag(post_id, admin.0.id, body.decision, body.notes)
        .await?;

    match outcome {
        ReviewOutcome::NoPendingFlag => Err(AppError::new(
            ErrorCode::FlagNotFound,
            "no pending flag for this post",
        )),
        ReviewOutcome::AlreadyResolved => Err(AppError::new(
            ErrorCode::FlagAlreadyResolved,
            "this flag has already been reviewed",
        )),
        resolved @ ReviewOutcome::Resolved { .. } => Ok(Json(ApiResponse::ok(resolved))),
    }
}

// --- Warnings ---

pub async fn issue_warning(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<IssueWarningRequest>,
) -> AppResult<Json<ApiResponse<IssuedWarning>>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let issued = state.engine.issue_warning(user_id, body.reason.trim()).await?;

    state.engine.store().record_admin_action(NewAdminAction {
        admin_id: admin.0.id,
        action: "issue_warning".to_string(),
        target_user_id: Some(user_id),
        details: Some(serde_json::json!({
            "warning_id": issued.warning.id,
            "reason": issued.warning.reason,
        })),
    })?;

    Ok(Json(ApiResponse::ok(issued)))
}

pub async fn clear_warning(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(warning_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CreatorWarning>>> {
    let warning = state.engine.clear_warning(warning_id, admin.0.id).await?;
    Ok(Json(ApiResponse::ok(warning)))
}

pub async fn warning_summary(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<WarningSummary>>> {
    Ok(Json(ApiResponse::ok(state.engine.warning_summary(user_id)?)))
}

pub async fn reinstate_user(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = state.engine.reinstate_user(user_id, admin.0.id).await?;
    Ok(Json(ApiResponse::ok(user)))
}

// --- Audit log ---

pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<AdminAction>>>> {
    Ok(Json(ApiResponse::ok(state.engine.audit_log(&params)?)))
}
