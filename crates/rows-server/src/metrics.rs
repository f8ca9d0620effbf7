//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if another recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Outbound frames dropped on a full queue (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Inbound messages decoded (counter, labels: type).
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
/// Upgrades refused at the connection limit (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Rooms created (counter, labels: kind).
pub const ROOMS_CREATED_TOTAL: &str = "rooms_created_total";
/// Live rooms in the registry (gauge).
pub const ROOMS_ACTIVE: &str = "rooms_active";
/// Accepted moves (counter, labels: player).
pub const MOVES_TOTAL: &str = "moves_total";
/// Finished games (counter, labels: outcome).
pub const GAMES_COMPLETED_TOTAL: &str = "games_completed_total";
