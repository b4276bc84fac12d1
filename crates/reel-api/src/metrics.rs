//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "reel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reel_http_requests_in_flight";

    pub const JOBS_CREATED_TOTAL: &str = "reel_jobs_created_total";
    pub const FILE_URLS_ISSUED_TOTAL: &str = "reel_file_urls_issued_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "reel_rate_limit_hits_total";
}

static JOB_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/api/jobs/[^/]+").expect("valid regex"));
static FILE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/files/[^/]+$").expect("valid regex"));

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a job accepted for processing.
pub fn record_job_created(duration_secs: u32) {
    let labels = [("duration", duration_secs.to_string())];
    counter!(names::JOBS_CREATED_TOTAL, &labels).increment(1);
}

/// Record a signed URL handed out.
pub fn record_file_url_issued(file: &str, owner: bool) {
    let labels = [
        ("file", file.to_string()),
        ("access", if owner { "owner" } else { "public" }.to_string()),
    ];
    counter!(names::FILE_URLS_ISSUED_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (collapse job ids and file names).
fn sanitize_path(path: &str) -> String {
    if path == "/api/jobs" {
        return path.to_string();
    }
    let path = JOB_SEGMENT.replace(path, "/api/jobs/:id");
    FILE_SEGMENT.replace(&path, "/files/:filename").to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
