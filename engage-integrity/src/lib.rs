pub mod config;
pub mod engine;
pub mod events;
pub mod jobs;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use metrics_exporter_prometheus::PrometheusHandle;

use config::AppConfig;
use engine::Engine;

pub struct AppState {
    pub config: AppConfig,
    pub engine: Engine,
    /// Absent in tests, where no global recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}
