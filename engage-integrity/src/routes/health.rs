use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use engage_shared::types::api::{HealthResponse, HealthStatus};

use crate::AppState;

/// Health check over the store, the rate-limit backend and the event broker.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = state.engine.health_checks().await;
    let response = HealthResponse::from_checks("engage-integrity", env!("CARGO_PKG_VERSION"), checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use crate::routes::test_support::{json_body, request, state};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_is_ok_on_memory_backend() {
        let (_, state) = state();
        let response = router(state).oneshot(request("GET", "/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let (_, state) = state();
        let response = router(state).oneshot(request("GET", "/metrics", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
