//! Metric helpers for `drugwire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. The library only
//! records; [`install_prometheus_exporter`] is for the binary.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "drugwire_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "drugwire_frames_processed_total";
/// Name of the counter tracking fatal connection errors.
pub const ERRORS_TOTAL: &str = "drugwire_errors_total";
/// Name of the counter tracking rejected upgrade requests.
pub const HANDSHAKE_FAILURES: &str = "drugwire_handshake_failures_total";
/// Name of the counter tracking panicking connection tasks.
pub const CONNECTION_PANICS: &str = "drugwire_connection_panics_total";

/// Direction of frame processing.
#[derive(Clone, Copy)]
pub enum Direction {
    /// Inbound frames received from a client.
    Inbound,
    /// Outbound frames sent to a client.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active connections gauge.
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record a fatal connection error.
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }

/// Record a rejected or timed-out handshake.
pub fn inc_handshake_failures() { counter!(HANDSHAKE_FAILURES).increment(1); }

/// Record a connection task that panicked.
pub fn inc_connection_panics() { counter!(CONNECTION_PANICS).increment(1); }

/// Install the global Prometheus recorder with an HTTP scrape endpoint on
/// `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`BuildError`] if a global recorder is already installed or the
/// listener cannot be created.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}
