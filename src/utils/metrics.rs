use std::net::SocketAddr;

use ::metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::utils::error::AppError;

pub const STORE_OUTCOMES: &str = "snowdash_store_outcomes_total";
pub const NOTIFICATIONS: &str = "snowdash_notifications_total";
pub const SESSION_ACQUISITIONS: &str = "snowdash_session_acquisitions_total";
pub const SCRAPE_ATTEMPTS: &str = "snowdash_scrape_attempts_total";

/// Serve the process counters over HTTP when enabled.
pub fn install_exporter(config: &MetricsConfig) -> Result<(), AppError> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| AppError::Internal(format!("Invalid metrics listen address '{}': {}", config.listen, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Internal(format!("Failed to install metrics exporter: {}", e)))?;

    tracing::info!("Metrics exporter listening on {}", addr);
    Ok(())
}

pub fn record_store_outcome(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(STORE_OUTCOMES, "status" => status).increment(1);
}

pub fn record_notification(kind: &'static str, delivered: bool) {
    let status = if delivered { "delivered" } else { "failed" };
    counter!(NOTIFICATIONS, "kind" => kind, "status" => status).increment(1);
}

pub fn record_session_acquisition(succeeded: bool) {
    let result = if succeeded { "success" } else { "failure" };
    counter!(SESSION_ACQUISITIONS, "result" => result).increment(1);
}

pub fn record_scrape_attempt() {
    counter!(SCRAPE_ATTEMPTS).increment(1);
}
