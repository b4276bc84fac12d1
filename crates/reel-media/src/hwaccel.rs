//! VAAPI hardware encode capability.
//!
//! Availability is probed lazily on first use and cached for the lifetime of
//! the capability object. `refresh` re-runs the probe.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::command::{FfmpegBackend, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Default VAAPI render node.
pub const DEFAULT_VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Default self-test timeout.
pub const DEFAULT_SELF_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the hardware device inside the filter graph.
pub const HW_DEVICE_NAME: &str = "va";

/// One-frame synthetic encode through the VAAPI pipeline.
pub fn self_test_command(device: &Path) -> FfmpegCommand {
    FfmpegCommand::new("-")
        .global_arg("-init_hw_device")
        .global_arg(format!("vaapi={}:{}", HW_DEVICE_NAME, device.display()))
        .global_arg("-filter_hw_device")
        .global_arg(HW_DEVICE_NAME)
        .input_with(["-f", "lavfi"], "nullsrc=s=64x64:d=0.1")
        .video_filter("format=nv12,hwupload")
        .video_codec("h264_vaapi")
        .output_args(["-frames:v", "1", "-f", "null"])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Auto,
    Forced(bool),
}

/// Lazily computed hardware encode availability.
pub struct HardwareCapability {
    device: PathBuf,
    backend: Arc<dyn FfmpegBackend>,
    timeout: Duration,
    mode: Probe,
    state: Mutex<Option<bool>>,
}

impl HardwareCapability {
    pub fn new(device: impl Into<PathBuf>, backend: Arc<dyn FfmpegBackend>) -> Self {
        Self {
            device: device.into(),
            backend,
            timeout: DEFAULT_SELF_TEST_TIMEOUT,
            mode: Probe::Auto,
            state: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capability that always answers `available` without probing.
    pub fn fixed(available: bool, device: impl Into<PathBuf>, backend: Arc<dyn FfmpegBackend>) -> Self {
        Self {
            mode: Probe::Forced(available),
            ..Self::new(device, backend)
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Whether the hardware path should be attempted. Probes once.
    pub async fn is_available(&self) -> bool {
        let mut state = self.state.lock().await;
        if let Some(available) = *state {
            return available;
        }
        let available = self.compute().await;
        *state = Some(available);
        available
    }

    /// Discard the cached answer and probe again.
    pub async fn refresh(&self) -> bool {
        let mut state = self.state.lock().await;
        let available = self.compute().await;
        *state = Some(available);
        available
    }

    async fn compute(&self) -> bool {
        if let Probe::Forced(available) = self.mode {
            return available;
        }
        match self.probe().await {
            Ok(()) => {
                info!(device = %self.device.display(), "VAAPI hardware encoding available");
                true
            }
            Err(e) => {
                warn!(
                    device = %self.device.display(),
                    "VAAPI unavailable, using software encoding: {}", e
                );
                false
            }
        }
    }

    async fn probe(&self) -> MediaResult<()> {
        if !self.device.exists() {
            return Err(MediaError::HardwareUnavailable(format!(
                "device {} not present",
                self.device.display()
            )));
        }
        self.backend
            .run(&self_test_command(&self.device), Some(self.timeout))
            .await
    }
}
