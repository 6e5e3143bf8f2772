//! # Broker Metrics
//!
//! Prometheus metrics for monitoring request flow through the broker.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! vp-request-broker = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `broker_requests_submitted_total` - Counter of accepted client requests (by kind)
//! - `broker_results_total` - Counter of resolved requests (by outcome)
//! - `broker_retries_total` - Counter of transient-busy retries
//! - `broker_pending_requests` - Gauge of live table entries

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Accepted client requests, labeled by kind
    pub static ref REQUESTS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "broker_requests_submitted_total",
        "Total number of client requests accepted by the broker",
        &["kind"]
    )
    .expect("Failed to create REQUESTS_SUBMITTED metric");

    /// Resolved requests, labeled by outcome
    pub static ref RESULTS: IntCounterVec = register_int_counter_vec!(
        "broker_results_total",
        "Total number of requests resolved, by outcome",
        &["outcome"]
    )
    .expect("Failed to create RESULTS metric");

    /// Transient-busy retries
    pub static ref RETRIES: IntCounter = register_int_counter!(
        "broker_retries_total",
        "Total number of requests re-issued after the device reported busy"
    )
    .expect("Failed to create RETRIES metric");

    /// Live pending entries
    pub static ref PENDING_REQUESTS: IntGauge = register_int_gauge!(
        "broker_pending_requests",
        "Number of entries in the pending request table"
    )
    .expect("Failed to create PENDING_REQUESTS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record accepted client requests
#[cfg(feature = "metrics")]
pub fn record_requests_submitted(kind: &str, count: usize) {
    REQUESTS_SUBMITTED
        .with_label_values(&[kind])
        .inc_by(count as u64);
}

/// Record resolved requests with an outcome label
#[cfg(feature = "metrics")]
pub fn record_results(outcome: &str, count: usize) {
    RESULTS.with_label_values(&[outcome]).inc_by(count as u64);
}

/// Record scheduled retries
#[cfg(feature = "metrics")]
pub fn record_retries(count: usize) {
    RETRIES.inc_by(count as u64);
}

/// Update the pending entries gauge
#[cfg(feature = "metrics")]
pub fn set_pending_requests(count: usize) {
    PENDING_REQUESTS.set(count as i64);
}

/// Encode every registered metric in the Prometheus text format
#[cfg(feature = "metrics")]
pub fn encode_metrics() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_requests_submitted(_kind: &str, _count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_results(_outcome: &str, _count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_retries(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn set_pending_requests(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn encode_metrics() -> String {
    String::new()
}
