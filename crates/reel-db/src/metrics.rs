//! Job store metrics.
//!
//! Counts queries by operation and outcome, and records their latency.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store queries by operation and outcome.
    pub const QUERIES_TOTAL: &str = "reel_db_queries_total";

    /// Query latency in seconds by operation.
    pub const QUERY_LATENCY_SECONDS: &str = "reel_db_query_latency_seconds";

    /// Push subscriptions opened.
    pub const SUBSCRIPTIONS_TOTAL: &str = "reel_db_subscriptions_total";
}

/// Record metrics for a completed query.
pub fn record_query(operation: &'static str, success: bool, latency_secs: f64) {
    counter!(
        names::QUERIES_TOTAL,
        "operation" => operation,
        "outcome" => if success { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::QUERY_LATENCY_SECONDS, "operation" => operation).record(latency_secs);
}

pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::QUERIES_TOTAL.starts_with("reel_db_"));
        assert!(names::QUERY_LATENCY_SECONDS.contains("latency"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_query("get", true, 0.01);
        record_subscription();
    }
}
