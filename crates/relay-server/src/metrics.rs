//! Prometheus metrics recorder and metric names.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup;
/// a second install fails because a global recorder is already set.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Register help text for every metric the hub emits.
pub fn describe() {
    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket upgrades accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket sessions ended");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "WebSocket sessions currently running");
    describe_counter!(MESSAGES_RECEIVED_TOTAL, "Inbound frames handed to a hub");
    describe_counter!(FRAMES_SENT_TOTAL, "Broadcast frames queued for delivery");
    describe_counter!(BROADCAST_DROPS_TOTAL, "Broadcast frames dropped for a recipient");
    describe_counter!(DECODE_ERRORS_TOTAL, "Inbound frames that were not a JSON string array");
    describe_counter!(COUNTER_RESETS_TOTAL, "Counter resets triggered by the reset frame");
    describe_histogram!(WS_CONNECTION_DURATION_SECONDS, "WebSocket session lifetime");
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "relay_ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "relay_ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "relay_ws_connections_active";
/// Inbound frames total (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Outbound broadcast frames queued (counter).
pub const FRAMES_SENT_TOTAL: &str = "relay_frames_sent_total";
/// Broadcast drops total (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Undecodable inbound frames (counter).
pub const DECODE_ERRORS_TOTAL: &str = "relay_decode_errors_total";
/// Counter resets (counter).
pub const COUNTER_RESETS_TOTAL: &str = "relay_counter_resets_total";
/// WebSocket session duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "relay_ws_connection_duration_seconds";
