//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// Push connections admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Live push connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Admissions refused (counter, labels: reason).
pub const WS_ADMISSIONS_REJECTED_TOTAL: &str = "ws_admissions_rejected_total";
/// Payloads dropped because a connection queue was full or closed (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Push connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Notifications built from domain events (counter, labels: kind).
pub const NOTIFICATIONS_DISPATCHED_TOTAL: &str = "notifications_dispatched_total";
/// Payloads enqueued onto a live connection (counter).
pub const NOTIFICATIONS_DELIVERED_TOTAL: &str = "notifications_delivered_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_ADMISSIONS_REJECTED_TOTAL,
            WS_SEND_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            NOTIFICATIONS_DISPATCHED_TOTAL,
            NOTIFICATIONS_DELIVERED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
