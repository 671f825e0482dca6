//! Prometheus metrics for the channel connection manager.
//!
//! This module provides:
//! - Connection metrics (attempts, failures by reason, active connections)
//! - Recovery metrics (bounded retries, self-healing reconnects)
//! - Frame metrics (received frames, dropped sends, listener panics)

mod helpers;

pub use helpers::{encode_metrics, ChannelMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "channel";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Connections currently open (0 or 1 under the single-active rule)
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of open channel connections"
    ).unwrap();

    /// Total connection attempts (initial, retry and reconnect)
    pub static ref CONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connect_attempts_total", METRIC_PREFIX),
        "Total connection attempts"
    ).unwrap();

    /// Failed connection attempts by reason
    pub static ref CONNECT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connect_failures_total", METRIC_PREFIX),
        "Failed connection attempts",
        &["reason"]
    ).unwrap();

    /// Connections closed by a sweep before a new connect
    pub static ref SWEPT_CONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_swept_connections_total", METRIC_PREFIX),
        "Connections torn down to keep a single active connection"
    ).unwrap();

    // ============================================================================
    // Recovery Metrics
    // ============================================================================

    /// Bounded retries scheduled after a failed initial attempt
    pub static ref RETRIES_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_scheduled_total", METRIC_PREFIX),
        "Retry timers scheduled"
    ).unwrap();

    /// Retry cycles that ended without opening
    pub static ref RETRIES_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_exhausted_total", METRIC_PREFIX),
        "Retry cycles exhausted without success"
    ).unwrap();

    /// Self-healing reconnects after an unexpected close
    pub static ref RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnects_total", METRIC_PREFIX),
        "Self-healing reconnects triggered by unexpected closes"
    ).unwrap();

    // ============================================================================
    // Frame Metrics
    // ============================================================================

    /// Inbound frames delivered to listeners
    pub static ref FRAMES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Inbound frames received"
    ).unwrap();

    /// Outbound application frames handed to the transport
    pub static ref FRAMES_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_sent_total", METRIC_PREFIX),
        "Outbound frames queued on an open connection"
    ).unwrap();

    /// Sends dropped because the connection was not open
    pub static ref SENDS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sends_dropped_total", METRIC_PREFIX),
        "Outbound frames dropped on a non-open connection"
    ).unwrap();

    /// Listener callbacks that panicked during delivery
    pub static ref LISTENER_PANICS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_listener_panics_total", METRIC_PREFIX),
        "Listener callbacks that panicked"
    ).unwrap();
}
