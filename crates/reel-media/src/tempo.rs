//! Duration fitting: time-stretch a voiceover to an exact target length.
//!
//! The tempo factor is `actual / target`. Factors close to 1 are left alone;
//! factors outside `[MIN_TEMPO_FACTOR, MAX_TEMPO_FACTOR]` are rejected before
//! any encode runs. A single `atempo` stage is only accurate in `[0.5, 2.0]`,
//! so larger corrections are split into a chain of stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reel_models::WordTiming;
use tracing::{debug, info};

use crate::command::{FfmpegBackend, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Factors strictly inside this band skip the stretch.
pub const SKIP_BAND: (f64, f64) = (0.95, 1.05);

pub const MIN_TEMPO_FACTOR: f64 = 0.25;
pub const MAX_TEMPO_FACTOR: f64 = 4.0;

/// Accurate range of a single atempo stage.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// What the fitter decided to do for a given pair of durations.
#[derive(Debug, Clone, PartialEq)]
pub enum TempoPlan {
    /// Close enough; audio is used as-is with factor 1.
    Unchanged,
    /// Stretch by `factor` through the given atempo stages.
    Stretch { factor: f64, stages: Vec<f64> },
}

impl TempoPlan {
    pub fn factor(&self) -> f64 {
        match self {
            TempoPlan::Unchanged => 1.0,
            TempoPlan::Stretch { factor, .. } => *factor,
        }
    }
}

/// Compute `actual / target`.
pub fn tempo_factor(actual_secs: f64, target_secs: f64) -> MediaResult<f64> {
    if !(actual_secs.is_finite() && actual_secs > 0.0) {
        return Err(MediaError::invalid_input(format!(
            "invalid audio duration: {actual_secs}"
        )));
    }
    if !(target_secs.is_finite() && target_secs > 0.0) {
        return Err(MediaError::invalid_input(format!(
            "invalid target duration: {target_secs}"
        )));
    }
    Ok(actual_secs / target_secs)
}

/// Decide whether and how to stretch.
pub fn plan_tempo(actual_secs: f64, target_secs: f64) -> MediaResult<TempoPlan> {
    let factor = tempo_factor(actual_secs, target_secs)?;

    if factor > SKIP_BAND.0 && factor < SKIP_BAND.1 {
        return Ok(TempoPlan::Unchanged);
    }

    if !(MIN_TEMPO_FACTOR..=MAX_TEMPO_FACTOR).contains(&factor) {
        return Err(MediaError::TempoOutOfRange {
            factor,
            min: MIN_TEMPO_FACTOR,
            max: MAX_TEMPO_FACTOR,
        });
    }

    Ok(TempoPlan::Stretch {
        factor,
        stages: atempo_stages(factor),
    })
}

/// Split `factor` into atempo stages each within `[0.5, 2.0]`.
///
/// The product of the stages equals `factor`; the last stage carries the
/// fractional remainder.
pub fn atempo_stages(factor: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    let mut remaining = factor;

    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);

    stages
}

/// Render stages as an FFmpeg audio filter chain.
pub fn atempo_filter(stages: &[f64]) -> String {
    stages
        .iter()
        .map(|s| format!("atempo={:.6}", s))
        .collect::<Vec<_>>()
        .join(",")
}

/// Rescale word timings to follow audio sped up by `factor`.
pub fn rescale_timings(words: &[WordTiming], factor: f64) -> Vec<WordTiming> {
    let scale = 1.0 / factor;
    words.iter().map(|w| w.scaled(scale)).collect()
}

/// Result of fitting a voiceover.
#[derive(Debug, Clone)]
pub struct FittedAudio {
    /// Audio to use downstream (the input itself when unchanged)
    pub path: PathBuf,
    /// Applied tempo factor (1.0 when unchanged)
    pub factor: f64,
    /// Measured duration of the input
    pub source_duration: f64,
    /// Word timings on the fitted audio's timeline
    pub timings: Vec<WordTiming>,
}

/// Stretches voiceover audio to a target duration.
pub struct DurationFitter {
    backend: Arc<dyn FfmpegBackend>,
    timeout: Option<Duration>,
}

impl DurationFitter {
    pub fn new(backend: Arc<dyn FfmpegBackend>) -> Self {
        Self {
            backend,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fit `input` to `target_secs`, writing `output` if a stretch is needed.
    ///
    /// The duration is measured from the file, not taken from any metadata
    /// returned by the speech service.
    pub async fn fit(
        &self,
        input: &Path,
        output: &Path,
        target_secs: f64,
        timings: &[WordTiming],
    ) -> MediaResult<FittedAudio> {
        let actual = self.backend.probe_duration(input).await?;
        let plan = plan_tempo(actual, target_secs)?;

        match plan {
            TempoPlan::Unchanged => {
                debug!(
                    actual_secs = actual,
                    target_secs, "Audio within tolerance, skipping tempo change"
                );
                Ok(FittedAudio {
                    path: input.to_path_buf(),
                    factor: 1.0,
                    source_duration: actual,
                    timings: timings.to_vec(),
                })
            }
            TempoPlan::Stretch { factor, stages } => {
                info!(
                    actual_secs = actual,
                    target_secs,
                    factor,
                    stages = stages.len(),
                    "Applying tempo change"
                );

                let cmd = FfmpegCommand::new(output)
                    .input(input)
                    .audio_filter(atempo_filter(&stages))
                    .output_arg("-vn")
                    .audio_codec("libmp3lame")
                    .audio_bitrate("192k");
                self.backend.run(&cmd, self.timeout).await?;

                Ok(FittedAudio {
                    path: output.to_path_buf(),
                    factor,
                    source_duration: actual,
                    timings: rescale_timings(timings, factor),
                })
            }
        }
    }
}
