//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reel_media::DEFAULT_VAAPI_DEVICE;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Interval of the pending-job sweep
    pub poll_interval: Duration,
    /// Wait before resubscribing after a push channel error
    pub resubscribe_backoff: Duration,
    /// Limit on opening the push subscription
    pub subscribe_timeout: Duration,
    /// Root of the per-job work directories
    pub work_dir: PathBuf,
    /// Root of the background catalog
    pub backgrounds_dir: PathBuf,
    /// VAAPI render node
    pub vaapi_device: PathBuf,
    /// Limit on the hardware self-test encode
    pub hw_selftest_timeout: Duration,
    /// Limit on each real encode
    pub encode_timeout: Duration,
    /// Graceful shutdown timeout for in-flight jobs
    pub shutdown_timeout: Duration,
    /// Maximum length of a stored error message
    pub error_message_max_len: usize,
    /// Port for the Prometheus listener, if any
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            poll_interval: Duration::from_secs(15),
            resubscribe_backoff: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(10),
            work_dir: PathBuf::from("/tmp/reelforge"),
            backgrounds_dir: PathBuf::from("./videos"),
            vaapi_device: PathBuf::from(DEFAULT_VAAPI_DEVICE),
            hw_selftest_timeout: Duration::from_secs(10),
            encode_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(60),
            error_message_max_len: 200,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            poll_interval: Duration::from_secs(
                std::env::var("WORKER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            resubscribe_backoff: Duration::from_secs(
                std::env::var("WORKER_RESUBSCRIBE_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            subscribe_timeout: Duration::from_secs(
                std::env::var("WORKER_SUBSCRIBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            backgrounds_dir: std::env::var("BACKGROUND_VIDEOS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.backgrounds_dir),
            vaapi_device: std::env::var("VAAPI_DEVICE")
                .map(PathBuf::from)
                .unwrap_or(defaults.vaapi_device),
            hw_selftest_timeout: Duration::from_secs(
                std::env::var("HW_SELFTEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            encode_timeout: Duration::from_secs(
                std::env::var("ENCODE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            error_message_max_len: std::env::var("ERROR_MESSAGE_MAX_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(200),
            metrics_port: std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()),
        }
    }
}
