use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const HTTP_DURATION: &str = "http_request_duration_seconds";

/// Request latency buckets, in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Probe and scrape endpoints stay out of the request metrics.
fn is_instrumented(path: &str) -> bool {
    !matches!(path, "/health" | "/metrics")
}

/// Count requests and record latency per method, route template and status.
pub async fn metrics_middleware(matched_path: Option<MatchedPath>, req: Request<Body>, next: Next) -> Response {
    let path = matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    if !is_instrumented(&path) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!(HTTP_DURATION, &labels).record(elapsed);

    response
}

/// Install the global Prometheus recorder. Call once at process start.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(HTTP_DURATION.to_string()), LATENCY_BUCKETS)
        .and_then(|builder| builder.install_recorder())
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))
}
