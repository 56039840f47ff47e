use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use engage_shared::middleware::metrics_middleware;

use crate::AppState;

pub mod admin;
pub mod earnings;
pub mod engagement;
pub mod health;
pub mod internal;

pub fn router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/flags", get(admin::list_pending_flags))
        .route("/flags/:post_id/review", put(admin::review_flag))
        .route("/users/:id/earnings", get(earnings::user_earnings_summary))
        .route("/users/:id/warnings", get(admin::warning_summary).post(admin::issue_warning))
        .route("/users/:id/reinstate", post(admin::reinstate_user))
        .route("/warnings/:id", delete(admin::clear_warning))
        .route("/mode/refresh", post(earnings::refresh_mode))
        .route("/audit-log", get(admin::audit_log));

    let internal_routes = Router::new()
        .route("/jobs/auto-flag", post(internal::run_auto_flag))
        .route("/jobs/settlement", post(internal::run_settlement));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/mode", get(earnings::current_mode))
        .route("/earnings/summary", get(earnings::my_earnings_summary))
        .route("/posts/:post_id/engagements", post(engagement::record_engagement))
        .route("/posts/:post_id/engagements/:kind", delete(engagement::remove_engagement))
        .nest("/admin", admin_routes)
        .nest("/internal", internal_routes)
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
