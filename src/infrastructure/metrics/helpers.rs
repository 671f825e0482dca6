//! Metrics helper struct for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, CONNECT_ATTEMPTS_TOTAL, CONNECT_FAILURES_TOTAL, FRAMES_RECEIVED_TOTAL,
    FRAMES_SENT_TOTAL, LISTENER_PANICS_TOTAL, RECONNECTS_TOTAL, RETRIES_EXHAUSTED_TOTAL,
    RETRIES_SCHEDULED_TOTAL, SENDS_DROPPED_TOTAL, SWEPT_CONNECTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording channel metrics
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_attempt() {
        CONNECT_ATTEMPTS_TOTAL.inc();
    }

    /// Record a failed attempt, labelled by error code
    pub fn record_failure(reason: &str) {
        CONNECT_FAILURES_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_opened() {
        CONNECTIONS_ACTIVE.inc();
    }

    pub fn record_closed() {
        CONNECTIONS_ACTIVE.dec();
    }

    pub fn record_swept(count: u64) {
        SWEPT_CONNECTIONS_TOTAL.inc_by(count);
    }

    pub fn record_retry_scheduled() {
        RETRIES_SCHEDULED_TOTAL.inc();
    }

    pub fn record_retries_exhausted() {
        RETRIES_EXHAUSTED_TOTAL.inc();
    }

    pub fn record_reconnect() {
        RECONNECTS_TOTAL.inc();
    }

    pub fn record_frame_received() {
        FRAMES_RECEIVED_TOTAL.inc();
    }

    pub fn record_frame_sent() {
        FRAMES_SENT_TOTAL.inc();
    }

    pub fn record_send_dropped() {
        SENDS_DROPPED_TOTAL.inc();
    }

    pub fn record_listener_panic() {
        LISTENER_PANICS_TOTAL.inc();
    }
}
