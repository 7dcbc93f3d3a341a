//! Metrics and observability utilities
//!
//! Prometheus metrics with latency histograms and standardized naming.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Achievo metrics
pub const METRICS_PREFIX: &str = "achievo";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Lifecycle metrics
    describe_counter!(
        format!("{}_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Lifecycle operations by transition and outcome"
    );

    describe_counter!(
        format!("{}_compensations_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating content deletes after a failed reference write"
    );

    describe_counter!(
        format!("{}_access_denied_total", METRICS_PREFIX),
        Unit::Count,
        "Operations refused by the access policy"
    );

    // Attachment metrics
    describe_counter!(
        format!("{}_attachments_stored_total", METRICS_PREFIX),
        Unit::Count,
        "Attachment files written to storage"
    );

    describe_counter!(
        format!("{}_attachment_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Attachment bytes written to storage"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record the outcome of a lifecycle operation (`create`, `submit`, ...)
pub fn record_transition(transition: &str, outcome: &str) {
    counter!(
        format!("{}_transitions_total", METRICS_PREFIX),
        "transition" => transition.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a compensating delete: `deleted`, `missing` or `failed`
pub fn record_compensation(outcome: &str) {
    counter!(
        format!("{}_compensations_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_access_denied(operation: &str) {
    counter!(
        format!("{}_access_denied_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_attachment(bytes: usize, mime: &str) {
    counter!(
        format!("{}_attachments_stored_total", METRICS_PREFIX),
        "mime" => mime.to_string()
    )
    .increment(1);

    counter!(format!("{}_attachment_bytes_total", METRICS_PREFIX)).increment(bytes as u64);
}
