//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "reel_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
    pub const JOBS_IN_FLIGHT: &str = "reel_jobs_in_flight";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
    pub const ENCODES_TOTAL: &str = "reel_encodes_total";
    pub const DISCOVERY_EVENTS_TOTAL: &str = "reel_discovery_events_total";
}

/// Serve `/metrics` on `port` from a background listener.
pub fn start_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a job claimed from `source` (recovery, poll or push).
pub fn record_claim(source: &'static str) {
    counter!(names::JOBS_CLAIMED_TOTAL, "source" => source).increment(1);
}

pub fn record_discovery_event(source: &'static str) {
    counter!(names::DISCOVERY_EVENTS_TOTAL, "source" => source).increment(1);
}

pub fn record_completed(duration_secs: u32) {
    counter!(names::JOBS_COMPLETED_TOTAL, "duration" => duration_secs.to_string()).increment(1);
}

pub fn record_failed(category: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "category" => category).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_stage_duration(stage: &'static str, secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(secs);
}

/// Record which encoder produced a video.
pub fn record_encode(path: &'static str) {
    counter!(names::ENCODES_TOTAL, "path" => path).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::JOBS_CLAIMED_TOTAL.starts_with("reel_"));
        assert!(names::STAGE_DURATION_SECONDS.ends_with("_seconds"));
    }
}
