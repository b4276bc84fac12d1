//! End-to-end pipeline runs against in-memory collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reel_ai::{AiError, AiResult, CompletionRequest, ScriptSynthesizer, SpeechSynthesizer, TextCompletionProvider};
use reel_db::{JobRepository, MemoryJobRepository};
use reel_media::testing::RecordingBackend;
use reel_media::{BackgroundCatalog, CaptionCompiler, DurationFitter, HardwareCapability, VideoCompositor};
use reel_models::{Job, JobStatus, TargetDuration, WordTiming};
use reel_storage::testing::MemoryObjectStore;
use reel_storage::{ArtifactPublisher, PublisherConfig};
use reel_worker::{JobOutcome, JobRunner, Orchestrator, Pipeline, PipelineComponents, PipelineSettings};
use tempfile::TempDir;

struct FixedProvider {
    text: String,
    calls: AtomicU32,
}

impl FixedProvider {
    fn with_words(count: usize) -> Arc<Self> {
        Arc::new(Self {
            text: vec!["octopus"; count].join(" "),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextCompletionProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _request: &CompletionRequest) -> AiResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

struct FakeSpeech {
    calls: AtomicU32,
    fail: bool,
}

impl FakeSpeech {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, _voice: &str, audio_out: &Path) -> AiResult<Vec<WordTiming>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AiError::speech_failed("backend at 10.0.0.7 refused"));
        }
        tokio::fs::write(audio_out, b"ID3").await?;
        Ok(text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| WordTiming::new(w, i as f64 * 0.3, i as f64 * 0.3 + 0.25))
            .collect())
    }
}

struct Harness {
    repo: Arc<MemoryJobRepository>,
    provider: Arc<FixedProvider>,
    speech: Arc<FakeSpeech>,
    backend: Arc<RecordingBackend>,
    store: Arc<MemoryObjectStore>,
    work: TempDir,
    _backgrounds: TempDir,
    pipeline: Arc<Pipeline>,
}

async fn harness_with(provider: Arc<FixedProvider>, speech: Arc<FakeSpeech>) -> Harness {
    let backgrounds = TempDir::new().unwrap();
    for duration in ["30", "60"] {
        let dir = backgrounds.path().join("minecraft").join(duration);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("bg_001.mp4"), b"").await.unwrap();
    }
    let work = TempDir::new().unwrap();

    let repo = Arc::new(MemoryJobRepository::new());
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryObjectStore::new());
    let hardware = Arc::new(HardwareCapability::fixed(false, "/dev/null", backend.clone()));

    let pipeline = Pipeline::new(
        PipelineComponents {
            repo: repo.clone(),
            script: ScriptSynthesizer::new(vec![provider.clone() as Arc<dyn TextCompletionProvider>], 3),
            speech: speech.clone(),
            fitter: DurationFitter::new(backend.clone()),
            captions: CaptionCompiler::default(),
            compositor: VideoCompositor::new(BackgroundCatalog::new(backgrounds.path()), hardware, backend.clone()),
            publisher: ArtifactPublisher::new(
                store.clone(),
                PublisherConfig {
                    base_delay: Duration::from_millis(1),
                    ..Default::default()
                },
            ),
        },
        PipelineSettings {
            work_dir: work.path().to_path_buf(),
            error_message_max_len: 200,
        },
    );

    Harness {
        repo,
        provider,
        speech,
        backend,
        store,
        work,
        _backgrounds: backgrounds,
        pipeline: Arc::new(pipeline),
    }
}

async fn harness() -> Harness {
    harness_with(FixedProvider::with_words(85), FakeSpeech::new(false)).await
}

fn job(background: &str, voice: &str) -> Job {
    Job::new("user-1", "Why octopuses have three hearts", TargetDuration::Short, voice, background)
}

async fn stored(repo: &MemoryJobRepository, job: &Job) -> Job {
    repo.get(&job.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_fresh_job_completes_through_every_stage() {
    let h = harness().await;
    let job = job("minecraft", "en-US-GuyNeural");
    h.repo.insert(&job).await.unwrap();

    assert_eq!(h.pipeline.run(&job.id).await, JobOutcome::Completed);

    assert_eq!(
        h.repo.status_history(&job.id),
        vec![
            JobStatus::Pending,
            JobStatus::GeneratingScript,
            JobStatus::GeneratingVoice,
            JobStatus::FittingAudio,
            JobStatus::BuildingSubtitles,
            JobStatus::AssemblingVideo,
            JobStatus::Uploading,
            JobStatus::Completed,
        ]
    );

    let done = stored(&h.repo, &job).await;
    let urls = done.artifacts().expect("all artifacts set");
    assert!(urls.video.contains(&format!("jobs/{}/video.mp4", job.id)));
    assert!(urls.audio.contains("audio.mp3"));
    assert!(urls.subtitles.contains("subtitles.ass"));
    assert!(done.error.is_none());
    assert_eq!(done.script.as_deref().map(|s| s.split_whitespace().count()), Some(85));

    assert_eq!(h.store.uploaded_keys().len(), 3);
    assert_eq!(h.provider.calls(), 1);
    assert!(!h.work.path().join(job.id.as_str()).exists());
}

#[tokio::test]
async fn test_recovered_job_reuses_script_and_resumes_forward() {
    let h = harness().await;
    let mut job = job("minecraft", "en-US-JennyNeural");
    job.status = JobStatus::AssemblingVideo;
    job.script = Some(vec!["squid"; 80].join(" "));
    h.repo.seed(job.clone());

    let orch = Orchestrator::new(h.repo.clone(), h.pipeline.clone(), 2);
    assert_eq!(orch.recover().await.unwrap(), 1);
    orch.wait_idle().await;

    let done = stored(&h.repo, &job).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        h.repo.status_history(&job.id),
        vec![JobStatus::AssemblingVideo, JobStatus::Uploading, JobStatus::Completed]
    );
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.speech.calls(), 1);
    assert!(done.script.unwrap().starts_with("squid"));
}

#[tokio::test]
async fn test_invalid_job_fails_without_running_stages() {
    let h = harness().await;
    let job = job("minecraft", "robot-voice");
    h.repo.insert(&job).await.unwrap();

    let outcome = h.pipeline.run(&job.id).await;
    assert!(matches!(&outcome, JobOutcome::Failed(msg) if msg.contains("Unsupported voice")));

    assert_eq!(h.repo.status_history(&job.id), vec![JobStatus::Pending, JobStatus::Failed]);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.speech.calls(), 0);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_upload_failure_marks_job_failed() {
    let h = harness().await;
    let job = job("minecraft", "en-US-GuyNeural");
    h.repo.insert(&job).await.unwrap();
    h.store.fail_next(&format!("jobs/{}/video.mp4", job.id), 10);

    let outcome = h.pipeline.run(&job.id).await;
    assert_eq!(outcome, JobOutcome::Failed("Cloud upload failed".to_string()));

    let failed = stored(&h.repo, &job).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("Cloud upload failed"));
    assert!(failed.artifacts().is_none());

    let history = h.repo.status_history(&job.id);
    assert_eq!(history[history.len() - 2], JobStatus::Uploading);
    assert!(!h.work.path().join(job.id.as_str()).exists());
}

#[tokio::test]
async fn test_missing_background_is_reported() {
    let h = harness().await;
    let job = job("lava", "en-US-GuyNeural");
    h.repo.insert(&job).await.unwrap();

    let outcome = h.pipeline.run(&job.id).await;
    assert!(matches!(&outcome, JobOutcome::Failed(msg) if msg.contains("lava")));

    let history = h.repo.status_history(&job.id);
    assert_eq!(&history[history.len() - 2..], &[JobStatus::AssemblingVideo, JobStatus::Failed]);
    // Nothing was encoded
    assert!(h.backend.calls_containing("video.mp4").is_empty());
}

#[tokio::test]
async fn test_speech_failure_is_sanitized() {
    let h = harness_with(FixedProvider::with_words(85), FakeSpeech::new(true)).await;
    let job = job("minecraft", "en-US-AriaNeural");
    h.repo.insert(&job).await.unwrap();

    let outcome = h.pipeline.run(&job.id).await;
    assert_eq!(outcome, JobOutcome::Failed("Voice generation failed".to_string()));

    let failed = stored(&h.repo, &job).await;
    assert!(!failed.error.unwrap().contains("10.0.0.7"));
    // The accepted script survives for the next attempt
    assert!(failed.script.is_some());
}

#[tokio::test]
async fn test_short_scripts_exhaust_attempts() {
    let h = harness_with(FixedProvider::with_words(20), FakeSpeech::new(false)).await;
    let job = job("minecraft", "en-US-GuyNeural");
    h.repo.insert(&job).await.unwrap();

    let outcome = h.pipeline.run(&job.id).await;
    assert_eq!(outcome, JobOutcome::Failed("Script generation failed".to_string()));
    assert_eq!(h.provider.calls(), 3);
    assert_eq!(h.speech.calls(), 0);
}

#[tokio::test]
async fn test_status_write_failure_stops_the_run() {
    let h = harness().await;
    let job = job("minecraft", "en-US-GuyNeural");
    h.repo.insert(&job).await.unwrap();
    h.repo.set_fail_writes(true);

    let outcome = h.pipeline.run(&job.id).await;
    assert!(matches!(outcome, JobOutcome::Failed(_)));

    h.repo.set_fail_writes(false);
    // Neither the stage write nor the failure write landed
    assert_eq!(stored(&h.repo, &job).await.status, JobStatus::Pending);
    assert_eq!(h.provider.calls(), 0);
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_terminal_job_is_skipped() {
    let h = harness().await;
    let mut job = job("minecraft", "en-US-GuyNeural");
    job.status = JobStatus::Completed;
    h.repo.seed(job.clone());

    assert_eq!(h.pipeline.run(&job.id).await, JobOutcome::Skipped);
    assert_eq!(h.pipeline.run(&reel_models::JobId::from_string("missing")).await, JobOutcome::Skipped);
    assert_eq!(h.provider.calls(), 0);
}
