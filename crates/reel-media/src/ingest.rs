//! Background catalog ingest: cut a long source video into fixed-length clips.
//!
//! Start times are sampled without replacement from a one-second grid inside
//! the source, after trimming intros and outros. Output clips carry no audio.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reel_models::{BackgroundCategory, TargetDuration};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{count_matching, BackgroundCatalog};
use crate::command::{check_ytdlp, stderr_tail, FfmpegBackend, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::hwaccel::{HardwareCapability, HW_DEVICE_NAME};

/// Seconds trimmed from both ends of the source.
pub const EDGE_TRIM_SECS: f64 = 10.0;

/// Default number of clips per ingest.
pub const DEFAULT_CLIP_COUNT: usize = 5;

/// Keep only the `v` query parameter of a video page URL.
pub fn clean_source_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let video_id = url
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned());

    url.set_query(None);
    if let Some(id) = video_id {
        url.query_pairs_mut().append_pair("v", &id);
    }
    url.to_string()
}

/// Sample sorted clip start times for a source of `source_secs`.
pub fn plan_segments<R: Rng + ?Sized>(
    source_secs: f64,
    clip_secs: f64,
    requested: usize,
    rng: &mut R,
) -> MediaResult<Vec<f64>> {
    let usable = source_secs - 2.0 * EDGE_TRIM_SECS;
    if usable < clip_secs {
        return Err(MediaError::invalid_input(format!(
            "source too short: {:.1}s usable after trimming, need {:.0}s",
            usable.max(0.0),
            clip_secs
        )));
    }

    // Integer starts s with EDGE_TRIM <= s and s + clip <= source - EDGE_TRIM
    let last_start = (source_secs - EDGE_TRIM_SECS - clip_secs).floor();
    let candidates = (last_start - EDGE_TRIM_SECS) as usize + 1;
    let fits = (usable / clip_secs).floor() as usize;
    let count = requested.min(fits).min(candidates);

    let mut starts: Vec<f64> = rand::seq::index::sample(rng, candidates, count)
        .into_iter()
        .map(|i| EDGE_TRIM_SECS + i as f64)
        .collect();
    starts.sort_by(|a, b| a.total_cmp(b));
    Ok(starts)
}

/// Encode one segment without audio.
pub fn segment_command(
    source: &Path,
    start: f64,
    clip_secs: f64,
    output: &Path,
    hw_device: Option<&Path>,
) -> FfmpegCommand {
    let seek = ["-ss".to_string(), format!("{:.3}", start)];
    match hw_device {
        Some(device) => FfmpegCommand::new(output)
            .global_arg("-init_hw_device")
            .global_arg(format!("vaapi={}:{}", HW_DEVICE_NAME, device.display()))
            .global_arg("-filter_hw_device")
            .global_arg(HW_DEVICE_NAME)
            .input_with(seek, source.to_string_lossy())
            .duration(clip_secs)
            .no_audio()
            .video_filter("format=nv12,hwupload")
            .video_codec("h264_vaapi")
            .output_args(["-qp", "18"])
            .faststart(),
        None => FfmpegCommand::new(output)
            .input_with(seek, source.to_string_lossy())
            .duration(clip_secs)
            .no_audio()
            .video_codec("libx264")
            .preset("veryfast")
            .crf(18)
            .output_args(["-pix_fmt", "yuv420p"])
            .faststart(),
    }
}

fn is_mp4(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false)
}

/// Download a source video with yt-dlp into `dir`.
pub async fn download_source(url: &str, dir: &Path, timeout: Duration) -> MediaResult<PathBuf> {
    check_ytdlp()?;
    tokio::fs::create_dir_all(dir).await?;

    let url = clean_source_url(url);
    let template = dir.join("source.%(ext)s");
    info!("Downloading background source {}", url);

    let child = Command::new("yt-dlp")
        .args([
            "--no-playlist",
            "-f",
            "bv*[height<=1440][ext=mp4]/bv*[height<=1440]",
            "--merge-output-format",
            "mp4",
            "-o",
        ])
        .arg(&template)
        .arg(&url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::download_failed(stderr_tail(&stderr, 5)));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("source.") {
            return Ok(entry.path());
        }
    }
    Err(MediaError::download_failed("yt-dlp produced no output file"))
}

/// Cuts sources into catalog clips.
pub struct CatalogIngest {
    catalog: BackgroundCatalog,
    hardware: Arc<HardwareCapability>,
    backend: Arc<dyn FfmpegBackend>,
    encode_timeout: Option<Duration>,
}

impl CatalogIngest {
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

    /// Cut up to `requested` clips from `source` into the catalog.
    ///
    /// New files are named `bg_NNN.mp4`, continuing after the existing
    /// `.mp4` files in the target directory.
    pub async fn ingest(
        &self,
        source: &Path,
        category: &BackgroundCategory,
        duration: TargetDuration,
        requested: usize,
    ) -> MediaResult<Vec<PathBuf>> {
        let source_secs = self.backend.probe_duration(source).await?;
        let clip_secs = duration.as_secs_f64();
        let starts = plan_segments(source_secs, clip_secs, requested, &mut rand::rng())?;

        let dir = self.catalog.dir_for(category, duration);
        tokio::fs::create_dir_all(&dir).await?;
        let existing = count_matching(&dir, is_mp4).await?;

        let mut use_hw = self.hardware.is_available().await;
        let mut written = Vec::with_capacity(starts.len());

        for (i, start) in starts.iter().enumerate() {
            let output = dir.join(format!("bg_{:03}.mp4", existing + i + 1));
            debug!(start, output = %output.display(), "Cutting segment");

            if use_hw {
                let cmd = segment_command(source, *start, clip_secs, &output, Some(self.hardware.device()));
                match self.backend.run(&cmd, self.encode_timeout).await {
                    Ok(()) => {
                        written.push(output);
                        continue;
                    }
                    Err(e) => {
                        warn!("VAAPI segment encode failed, switching to software: {}", e);
                        use_hw = false;
                    }
                }
            }

            let cmd = segment_command(source, *start, clip_secs, &output, None);
            self.backend.run(&cmd, self.encode_timeout).await?;
            written.push(output);
        }

        info!(
            category = %category,
            duration = duration.as_secs(),
            clips = written.len(),
            "Ingested background clips"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_clean_source_url() {
        assert_eq!(
            clean_source_url("https://www.youtube.com/watch?v=abc123&list=PL1&t=42s"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            clean_source_url("https://example.com/video.mp4?token=x"),
            "https://example.com/video.mp4"
        );
        assert_eq!(clean_source_url("not a url"), "not a url");
    }

    #[test]
    fn test_plan_segments_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let starts = plan_segments(200.0, 30.0, 5, &mut rng).unwrap();

        assert_eq!(starts.len(), 5);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
        for s in &starts {
            assert!(*s >= EDGE_TRIM_SECS);
            assert!(s + 30.0 <= 200.0 - EDGE_TRIM_SECS);
            assert_eq!(s.fract(), 0.0);
        }
    }

    #[test]
    fn test_plan_segments_limited_by_usable_span() {
        let mut rng = StdRng::seed_from_u64(1);
        // 95s usable fits three 30s clips
        let starts = plan_segments(115.0, 30.0, 10, &mut rng).unwrap();
        assert_eq!(starts.len(), 3);

        // Exactly one candidate start
        let starts = plan_segments(50.0, 30.0, 5, &mut rng).unwrap();
        assert_eq!(starts, vec![10.0]);

        assert!(plan_segments(45.0, 30.0, 5, &mut rng).is_err());
    }

    #[tokio::test]
    async fn test_ingest_continues_numbering() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("minecraft").join("60");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("bg_001.mp4"), b"").await.unwrap();
        tokio::fs::write(dir.join("bg_002.mp4"), b"").await.unwrap();

        let backend = Arc::new(RecordingBackend::new().with_default_duration(600.0));
        let hw = Arc::new(HardwareCapability::fixed(false, "/dev/null", backend.clone()));
        let ingest = CatalogIngest::new(BackgroundCatalog::new(root.path()), hw, backend.clone());

        let category = BackgroundCategory::parse("minecraft").unwrap();
        let written = ingest
            .ingest(Path::new("source.mp4"), &category, TargetDuration::Long, 2)
            .await
            .unwrap();

        assert_eq!(written, vec![dir.join("bg_003.mp4"), dir.join("bg_004.mp4")]);
        for call in backend.calls() {
            assert!(call.contains(&"-an".to_string()));
            assert!(call.contains(&"libx264".to_string()));
        }
    }

    #[tokio::test]
    async fn test_ingest_falls_back_to_software_after_hw_failure() {
        let root = TempDir::new().unwrap();
        let backend = Arc::new(
            RecordingBackend::new()
                .with_default_duration(300.0)
                .fail_when("h264_vaapi"),
        );
        let hw = Arc::new(HardwareCapability::fixed(true, "/dev/dri/renderD128", backend.clone()));
        let ingest = CatalogIngest::new(BackgroundCatalog::new(root.path()), hw, backend.clone());

        let category = BackgroundCategory::parse("ocean").unwrap();
        let written = ingest
            .ingest(Path::new("source.mp4"), &category, TargetDuration::Short, 3)
            .await
            .unwrap();

        assert_eq!(written.len(), 3);
        // One failed hardware attempt, then software for every clip
        assert_eq!(backend.calls_containing("h264_vaapi").len(), 1);
        assert_eq!(backend.calls_containing("libx264").len(), 3);
    }
}
