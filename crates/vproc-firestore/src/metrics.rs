//! Firestore request metrics.

use metrics::{counter, histogram};

/// Metric names.
pub mod names {
    /// Requests by operation and resulting status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";
    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";
    /// Request latency by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";
    /// Conditional writes rejected because the document changed.
    pub const PRECONDITION_CONFLICTS_TOTAL: &str = "firestore_precondition_conflicts_total";
}

/// Record a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string())
        .record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_precondition_conflict(collection: &str) {
    counter!(
        names::PRECONDITION_CONFLICTS_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(1);
}
