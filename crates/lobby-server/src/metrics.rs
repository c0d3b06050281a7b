//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Connection lifetimes run from seconds to hours.
const CONNECTION_BUCKETS: &[f64] = &[1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14_400.0];

/// Handlers are synchronous and short.
const RPC_BUCKETS: &[f64] = &[0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(LOBBY_CONNECTION_DURATION_SECONDS.to_owned()), CONNECTION_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(RPC_REQUEST_DURATION_SECONDS.to_owned()), RPC_BUCKETS)
}

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = builder()?.install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// RPC requests total (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// RPC errors total (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// RPC request duration seconds (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
/// Connections opened total (counter, labels: transport).
pub const LOBBY_CONNECTIONS_TOTAL: &str = "lobby_connections_total";
/// Open connections (gauge, labels: transport).
pub const LOBBY_CONNECTIONS_ACTIVE: &str = "lobby_connections_active";
/// Connection lifetime seconds (histogram, labels: transport).
pub const LOBBY_CONNECTION_DURATION_SECONDS: &str = "lobby_connection_duration_seconds";
/// Relay frames forwarded total (counter).
pub const LOBBY_RELAY_FRAMES_TOTAL: &str = "lobby_relay_frames_total";
/// Users evicted total (counter, labels: reason).
pub const LOBBY_EVICTIONS_TOTAL: &str = "lobby_evictions_total";
/// Outbound frames dropped on a full queue (counter).
pub const LOBBY_SEND_DROPS_TOTAL: &str = "lobby_send_drops_total";
