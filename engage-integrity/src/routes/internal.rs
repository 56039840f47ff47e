use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::Json;
use serde::Serialize;
use subtle::ConstantTimeEq;

use engage_shared::errors::{AppError, AppResult, ErrorCode};
use engage_shared::middleware::extract_bearer_token;
use engage_shared::types::api::ApiResponse;

use crate::services::settlement::SweepReport;
use crate::AppState;

/// Caller presented the shared scheduler secret as a bearer token.
pub struct SchedulerAuth;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for SchedulerAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let expected = state.config.scheduler_secret.as_bytes();

        if expected.is_empty() || !bool::from(token.as_bytes().ct_eq(expected)) {
            return Err(AppError::new(ErrorCode::SchedulerSecretInvalid, "invalid scheduler secret"));
        }
        Ok(Self)
    }
}

#[derive(Debug, Serialize)]
pub struct AutoFlagResponse {
    pub flagged: usize,
}

/// POST /internal/jobs/auto-flag
pub async fn run_auto_flag(
    State(state): State<Arc<AppState>>,
    _scheduler: SchedulerAuth,
) -> AppResult<Json<ApiResponse<AutoFlagResponse>>> {
    let flagged = state.engine.run_auto_flag_pass().await?;
    Ok(Json(ApiResponse::ok(AutoFlagResponse { flagged })))
}

/// POST /internal/jobs/settlement
pub async fn run_settlement(
    State(state): State<Arc<AppState>>,
    _scheduler: SchedulerAuth,
) -> AppResult<Json<ApiResponse<SweepReport>>> {
    let report = state.engine.run_settlement_sweep().await?;
    Ok(Json(ApiResponse::ok(report)))
}

#[cfg(test)]
mod tests {
    use crate::routes::router;
    use crate::routes::test_support::{bearer, json_body, request, state};
    use axum::http::StatusCode;
    use engage_shared::types::auth::UserRole;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn sweep_runs_with_scheduler_secret() {
        let (_, state) = state();
        let secret = format!("Bearer {}", state.config.scheduler_secret);
        let response = router(state)
            .oneshot(request("POST", "/internal/jobs/settlement", Some(secret), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["total_reviewed"], 0);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let (_, state) = state();
        let app = router(state);

        let wrong = app
            .clone()
            .oneshot(request("POST", "/internal/jobs/auto-flag", Some("Bearer nope".into()), None))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong).await["error"]["code"], "E1015");

        // A user JWT is not the scheduler secret, even an admin one.
        let admin = app
            .oneshot(request(
                "POST",
                "/internal/jobs/auto-flag",
                Some(bearer(Uuid::new_v4(), UserRole::Admin)),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::UNAUTHORIZED);
    }
}
