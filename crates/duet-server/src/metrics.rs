//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
#[must_use]
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Connection-level metric names. The matchmaking metrics live in
// `duet_switchboard::metrics`.

/// Connections accepted total (counter).
pub const CONNECTIONS_TOTAL: &str = "duet_connections_total";
/// Currently open connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "duet_connections_active";
/// Connection lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "duet_connection_duration_seconds";
/// Connections evicted for missing the auth window (counter).
pub const AUTH_TIMEOUTS_TOTAL: &str = "duet_auth_timeouts_total";
