//! Metrics collection and export for Murmur.
//!
//! Uses the `metrics` crate for instrumentation. Recording is a no-op until
//! a recorder is installed; the binary installs the Prometheus exporter when
//! enabled.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use murmur_core::ConnectionState;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const FRAMES_TOTAL: &str = "murmur_frames_total";
    pub const FRAME_BYTES: &str = "murmur_frame_bytes";
    pub const MALFORMED_FRAMES_TOTAL: &str = "murmur_malformed_frames_total";
    pub const RECONNECT_ATTEMPTS_TOTAL: &str = "murmur_reconnect_attempts_total";
    pub const CONNECTION_STATE: &str = "murmur_connection_state";
    pub const ERRORS_TOTAL: &str = "murmur_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames exchanged with the server");
    metrics::describe_counter!(names::FRAME_BYTES, "Bytes of frames exchanged with the server");
    metrics::describe_counter!(
        names::MALFORMED_FRAMES_TOTAL,
        "Inbound frames dropped as malformed"
    );
    metrics::describe_counter!(
        names::RECONNECT_ATTEMPTS_TOTAL,
        "Automatic reconnection attempts scheduled"
    );
    metrics::describe_gauge!(
        names::CONNECTION_STATE,
        "Connection state (0 disconnected, 1 connecting, 2 connected)"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record an inbound frame that could not be decoded.
pub fn record_malformed() {
    counter!(names::MALFORMED_FRAMES_TOTAL).increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!(names::RECONNECT_ATTEMPTS_TOTAL).increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
    };
    gauge!(names::CONNECTION_STATE).set(value);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
