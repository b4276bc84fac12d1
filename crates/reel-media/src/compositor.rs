//! Final video composition: background + voiceover + burned-in captions.
//!
//! The VAAPI path is tried first when the hardware capability reports it as
//! available. Any hardware failure falls back to a single libx264 encode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reel_models::{BackgroundCategory, TargetDuration};
use tracing::{info, warn};

use crate::captions::{PLAY_RES_X, PLAY_RES_Y};
use crate::catalog::BackgroundCatalog;
use crate::command::{FfmpegBackend, FfmpegCommand};
use crate::error::MediaResult;
use crate::hwaccel::{HardwareCapability, HW_DEVICE_NAME};

/// Which encoder produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePath {
    Hardware,
    Software,
}

impl EncodePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodePath::Hardware => "vaapi",
            EncodePath::Software => "libx264",
        }
    }
}

/// Inputs for one composition.
#[derive(Debug, Clone)]
pub struct CompositionRequest<'a> {
    pub job_id: &'a str,
    pub audio: &'a Path,
    pub subtitles: &'a Path,
    pub category: &'a BackgroundCategory,
    pub duration: TargetDuration,
    pub output: &'a Path,
}

#[derive(Debug, Clone)]
pub struct CompositionOutput {
    pub path: PathBuf,
    pub background: PathBuf,
    pub encode_path: EncodePath,
}

/// Escape a path for use as a filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Scale to cover the frame, centre-crop, then burn in subtitles.
fn base_filter(subtitles: &Path) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,subtitles='{subs}'",
        w = PLAY_RES_X,
        h = PLAY_RES_Y,
        subs = escape_filter_path(subtitles)
    )
}

fn with_common_io(
    cmd: FfmpegCommand,
    background: &Path,
    audio: &Path,
) -> FfmpegCommand {
    cmd.input_with(["-stream_loop", "-1"], background.to_string_lossy())
        .input(audio)
        .map("0:v:0")
        .map("1:a:0")
}

fn with_common_output(cmd: FfmpegCommand, duration: TargetDuration) -> FfmpegCommand {
    cmd.audio_codec("aac")
        .audio_bitrate("192k")
        .duration(duration.as_secs_f64())
        .faststart()
}

/// libx264 encode command.
pub fn software_command(
    background: &Path,
    audio: &Path,
    subtitles: &Path,
    duration: TargetDuration,
    output: &Path,
) -> FfmpegCommand {
    let cmd = with_common_io(FfmpegCommand::new(output), background, audio)
        .video_filter(format!("{},format=yuv420p", base_filter(subtitles)))
        .video_codec("libx264")
        .preset("veryfast")
        .crf(23);
    with_common_output(cmd, duration)
}

/// VAAPI encode command. Subtitles are rendered in software before upload.
pub fn vaapi_command(
    device: &Path,
    background: &Path,
    audio: &Path,
    subtitles: &Path,
    duration: TargetDuration,
    output: &Path,
) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(output)
        .global_arg("-init_hw_device")
        .global_arg(format!("vaapi={}:{}", HW_DEVICE_NAME, device.display()))
        .global_arg("-filter_hw_device")
        .global_arg(HW_DEVICE_NAME);
    let cmd = with_common_io(cmd, background, audio)
        .video_filter(format!("{},format=nv12,hwupload", base_filter(subtitles)))
        .video_codec("h264_vaapi")
        .output_args(["-qp", "20"]);
    with_common_output(cmd, duration)
}

/// Composites the final vertical video.
pub struct VideoCompositor {
    catalog: BackgroundCatalog,
    hardware: Arc<HardwareCapability>,
    backend: Arc<dyn FfmpegBackend>,
    encode_timeout: Option<Duration>,
}

impl VideoCompositor {
    pub fn new(
        catalog: BackgroundCatalog,
        hardware: Arc<HardwareCapability>,
        backend: Arc<dyn FfmpegBackend>,
    ) -> Self {
        Self {
            catalog,
            hardware,
            backend,
            encode_timeout: None,
        }
    }

    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = Some(timeout);
        self
    }

    /// Pick a background and encode the output.
    pub async fn compose(&self, req: &CompositionRequest<'_>) -> MediaResult<CompositionOutput> {
        let background = self.catalog.pick_random(req.category, req.duration).await?;

        if self.hardware.is_available().await {
            let cmd = vaapi_command(
                self.hardware.device(),
                &background,
                req.audio,
                req.subtitles,
                req.duration,
                req.output,
            );
            match self.backend.run(&cmd, self.encode_timeout).await {
                Ok(()) => {
                    info!(job_id = req.job_id, "Composed video with VAAPI");
                    return Ok(CompositionOutput {
                        path: req.output.to_path_buf(),
                        background,
                        encode_path: EncodePath::Hardware,
                    });
                }
                Err(e) => {
                    warn!(
                        job_id = req.job_id,
                        "VAAPI encode failed, falling back to software: {}", e
                    );
                    let _ = tokio::fs::remove_file(req.output).await;
                }
            }
        }

        let cmd = software_command(
            &background,
            req.audio,
            req.subtitles,
            req.duration,
            req.output,
        );
        self.backend.run(&cmd, self.encode_timeout).await?;
        info!(job_id = req.job_id, "Composed video with libx264");

        Ok(CompositionOutput {
            path: req.output.to_path_buf(),
            background,
            encode_path: EncodePath::Software,
        })
    }
}
