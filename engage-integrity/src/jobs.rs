use std::sync::Arc;
use std::time::Duration;

use crate::AppState;

/// Spawn a background task that sweeps held earnings on the configured interval.
pub fn spawn_settlement_task(state: Arc<AppState>) {
    let every = Duration::from_secs(state.config.scheduler.settlement_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            tracing::info!("running held-earnings settlement sweep");
            match state.engine.run_settlement_sweep().await {
                Ok(report) => {
                    tracing::info!(
                        reviewed = report.total_reviewed,
                        released = report.released,
                        still_held = report.still_held,
                        failed = report.failed,
                        "settlement sweep completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "settlement sweep failed");
                }
            }
        }
    });
}

/// Spawn a background task that runs the suspicious-engagement detectors.
pub fn spawn_auto_flag_task(state: Arc<AppState>) {
    let every = Duration::from_secs(state.config.scheduler.auto_flag_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            tracing::info!("running auto-flag pass");
            match state.engine.run_auto_flag_pass().await {
                Ok(flagged) => {
                    tracing::info!(flagged, "auto-flag pass completed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "auto-flag pass failed");
                }
            }
        }
    });
}
