use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use engage_shared::errors::AppResult;
use engage_shared::middleware::AdminUser;
use engage_shared::types::api::ApiResponse;
use engage_shared::types::auth::AuthUser;

use crate::services::earnings::EarningsSummary;
use crate::services::mode_config::ModeSnapshot;
use crate::AppState;

/// GET /earnings/summary
pub async fn my_earnings_summary(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<EarningsSummary>>> {
    let summary = state.engine.creator_earnings_summary(user.id)?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /admin/users/:id/earnings
pub async fn user_earnings_summary(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<EarningsSummary>>> {
    let summary = state.engine.creator_earnings_summary(user_id)?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /mode
pub async fn current_mode(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<ModeSnapshot>>> {
    Ok(Json(ApiResponse::ok(state.engine.current_mode()?)))
}

/// POST /admin/mode/refresh: drop the cached mode row and read it again.
pub async fn refresh_mode(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> AppResult<Json<ApiResponse<ModeSnapshot>>> {
    state.engine.invalidate_mode_cache();
    let snapshot = state.engine.current_mode()?;
    tracing::info!(admin_id = %admin.0.id, mode = %snapshot.mode, "mode config cache refreshed");
    Ok(Json(ApiResponse::ok(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlatformMode;
    use crate::routes::router;
    use crate::routes::test_support::{bearer, json_body, request, state};
    use crate::services::test_support::{mode_row, user};
    use axum::http::StatusCode;
    use engage_shared::types::auth::UserRole;
    use tower::ServiceExt;

    #[tokio::test]
    async fn creator_sees_own_summary() {
        let (store, state) = state();
        let creator = user();
        let id = creator.id;
        store.put_user(creator).unwrap();

        let response = router(state)
            .oneshot(request("GET", "/earnings/summary", Some(bearer(id, UserRole::User)), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["user_id"], id.to_string());
        assert_eq!(body["data"]["total_earned"], 0);
    }

    #[tokio::test]
    async fn admin_summary_requires_admin() {
        let (store, state) = state();
        let creator = user();
        let id = creator.id;
        store.put_user(creator).unwrap();
        let uri = format!("/admin/users/{id}/earnings");
        let app = router(state);

        let forbidden = app
            .clone()
            .oneshot(request("GET", &uri, Some(bearer(Uuid::new_v4(), UserRole::User)), None))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let ok = app
            .oneshot(request("GET", &uri, Some(bearer(Uuid::new_v4(), UserRole::Admin)), None))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_picks_up_mode_change() {
        let (store, state) = state();
        let app = router(state);
        let admin = bearer(Uuid::new_v4(), UserRole::Admin);

        let before = app.clone().oneshot(request("GET", "/mode", Some(admin.clone()), None)).await.unwrap();
        assert_eq!(json_body(before).await["data"]["mode"], "BETA");

        store.put_mode_config(mode_row(PlatformMode::Natural, 20, 100)).unwrap();
        let refreshed = app
            .oneshot(request("POST", "/admin/mode/refresh", Some(admin), None))
            .await
            .unwrap();
        let body = json_body(refreshed).await;
        assert_eq!(body["data"]["mode"], "NATURAL");
        assert_eq!(body["data"]["caps"]["per_post"], 20);
    }
}
