//! One job run: script, voice, fit, captions, composition, upload.
//!
//! Every run starts from the stored record, so a job interrupted by a crash
//! resumes through the same path as a fresh one. Status writes only move a job
//! forward; stages the record has already passed are re-executed without
//! rewriting the status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reel_ai::{OpenAiCompatProvider, ScriptServiceConfig, ScriptSynthesizer, SpeechSynthesizer, VoiceSynthesizer};
use reel_db::JobRepository;
use reel_media::{
    BackgroundCatalog, CaptionCompiler, CompositionRequest, DurationFitter, FfmpegBackend, FfmpegRunner,
    HardwareCapability, VideoCompositor,
};
use reel_models::{Job, JobId, JobStatus};
use reel_storage::{ArtifactPublisher, LocalArtifacts, ObjectStore, PublisherConfig, R2Client};
use tracing::{debug, Instrument};

use crate::config::WorkerConfig;
use crate::error::{ErrorCategory, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::workspace::JobWorkspace;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Failed with the message stored on the record
    Failed(String),
    /// Nothing to do: the job is missing or already terminal
    Skipped,
}

/// Executes one job to a terminal state.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job_id: &JobId) -> JobOutcome;
}

/// The components a pipeline drives.
pub struct PipelineComponents {
    pub repo: Arc<dyn JobRepository>,
    pub script: ScriptSynthesizer,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub fitter: DurationFitter,
    pub captions: CaptionCompiler,
    pub compositor: VideoCompositor,
    pub publisher: ArtifactPublisher,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub error_message_max_len: usize,
}

impl From<&WorkerConfig> for PipelineSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            error_message_max_len: config.error_message_max_len,
        }
    }
}

/// Status most recently written for the job, and the stage being timed.
struct StageTracker {
    stored: JobStatus,
    stage: Option<(JobStatus, Instant)>,
}

impl StageTracker {
    fn new(stored: JobStatus) -> Self {
        Self { stored, stage: None }
    }

    fn enter(&mut self, stage: JobStatus) {
        self.finish();
        self.stage = Some((stage, Instant::now()));
    }

    fn finish(&mut self) {
        if let Some((stage, started)) = self.stage.take() {
            metrics::record_stage_duration(stage.as_str(), started.elapsed().as_secs_f64());
        }
    }
}

pub struct Pipeline {
    repo: Arc<dyn JobRepository>,
    script: ScriptSynthesizer,
    speech: Arc<dyn SpeechSynthesizer>,
    fitter: DurationFitter,
    captions: CaptionCompiler,
    compositor: VideoCompositor,
    publisher: ArtifactPublisher,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self {
            repo: components.repo,
            script: components.script,
            speech: components.speech,
            fitter: components.fitter,
            captions: components.captions,
            compositor: components.compositor,
            publisher: components.publisher,
            settings,
        }
    }

    /// Build the production pipeline from environment configuration.
    pub async fn from_env(config: &WorkerConfig, repo: Arc<dyn JobRepository>) -> WorkerResult<Self> {
        let script_config =
            ScriptServiceConfig::from_env().map_err(|e| WorkerError::config_error(e.to_string()))?;
        let providers = OpenAiCompatProvider::from_config(&script_config)
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        let speech = VoiceSynthesizer::from_env().map_err(|e| WorkerError::config_error(e.to_string()))?;

        let backend: Arc<dyn FfmpegBackend> = Arc::new(FfmpegRunner::new());
        let hardware = Arc::new(
            HardwareCapability::new(&config.vaapi_device, Arc::clone(&backend))
                .with_timeout(config.hw_selftest_timeout),
        );
        let compositor = VideoCompositor::new(
            BackgroundCatalog::new(&config.backgrounds_dir),
            hardware,
            Arc::clone(&backend),
        )
        .with_encode_timeout(config.encode_timeout);

        let store: Arc<dyn ObjectStore> = Arc::new(R2Client::from_env().await?);

        Ok(Self::new(
            PipelineComponents {
                repo,
                script: ScriptSynthesizer::new(providers, script_config.attempts_per_model),
                speech: Arc::new(speech),
                fitter: DurationFitter::new(backend).with_timeout(config.encode_timeout),
                captions: CaptionCompiler::default(),
                compositor,
                publisher: ArtifactPublisher::new(store, PublisherConfig::from_env()),
            },
            PipelineSettings::from(config),
        ))
    }

    async fn process(&self, job_id: &JobId, logger: &JobLogger) -> JobOutcome {
        let job = match self.repo.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                logger.log_warning("Job record not found, skipping");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                logger.log_persistence_error("load", &e);
                return JobOutcome::Skipped;
            }
        };

        if job.status.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Job already terminal, skipping");
            return JobOutcome::Skipped;
        }

        logger.log_start(&format!("{} ({}s) from {}", job.topic, job.duration_secs, job.status));
        let started = Instant::now();

        let workspace = JobWorkspace::new(&self.settings.work_dir, &job.id);
        let result = match &workspace {
            Ok(ws) => self.execute(&job, ws, logger).await,
            Err(e) => Err(WorkerError::internal(e.to_string())),
        };

        let outcome = match result {
            Ok(()) => {
                metrics::record_completed(job.duration_secs);
                logger.log_completion(&format!("finished in {:.1}s", started.elapsed().as_secs_f64()));
                JobOutcome::Completed
            }
            Err(err) => self.record_failure(&job, &err, logger).await,
        };

        if let Ok(ws) = &workspace {
            if let Err(e) = ws.cleanup().await {
                logger.log_warning(&format!("Failed to remove work dir {}: {}", ws.dir().display(), e));
            }
        }
        outcome
    }

    async fn execute(&self, job: &Job, workspace: &JobWorkspace, logger: &JobLogger) -> WorkerResult<()> {
        // Nothing runs for a job that fails validation
        let spec = job.validate()?;
        workspace.prepare().await?;

        let mut tracker = StageTracker::new(job.status);

        self.advance(&job.id, &mut tracker, JobStatus::GeneratingScript, logger).await?;
        let script = match job.existing_script() {
            Some(text) => {
                logger.log_progress("Reusing stored script");
                text.to_string()
            }
            None => {
                let script = self
                    .script
                    .generate(&spec.topic, spec.duration)
                    .await
                    .map_err(WorkerError::Script)?;
                logger.log_progress(&format!(
                    "Script ready: {} words from {} after {} calls",
                    script.word_count, script.model, script.attempts
                ));
                self.repo.set_script(&job.id, &script.text).await?;
                script.text
            }
        };

        self.advance(&job.id, &mut tracker, JobStatus::GeneratingVoice, logger).await?;
        let raw_audio = workspace.voice_raw();
        let timings = self
            .speech
            .synthesize(&script, spec.voice.as_str(), &raw_audio)
            .await
            .map_err(WorkerError::Voice)?;

        self.advance(&job.id, &mut tracker, JobStatus::FittingAudio, logger).await?;
        let fitted = self
            .fitter
            .fit(&raw_audio, &workspace.voice_fitted(), spec.duration.as_secs_f64(), &timings)
            .await?;
        if fitted.factor != 1.0 {
            logger.log_progress(&format!(
                "Audio fitted from {:.2}s with tempo {:.3}",
                fitted.source_duration, fitted.factor
            ));
        }

        self.advance(&job.id, &mut tracker, JobStatus::BuildingSubtitles, logger).await?;
        let subtitles = workspace.subtitles();
        self.captions.write(&fitted.timings, &subtitles).await?;

        self.advance(&job.id, &mut tracker, JobStatus::AssemblingVideo, logger).await?;
        let composed = self
            .compositor
            .compose(&CompositionRequest {
                job_id: job.id.as_str(),
                audio: &fitted.path,
                subtitles: &subtitles,
                category: &spec.background,
                duration: spec.duration,
                output: &workspace.video(),
            })
            .await?;
        metrics::record_encode(composed.encode_path.as_str());

        self.advance(&job.id, &mut tracker, JobStatus::Uploading, logger).await?;
        let urls = self
            .publisher
            .publish(
                &job.id,
                &LocalArtifacts {
                    audio: fitted.path.clone(),
                    subtitles,
                    video: composed.path,
                },
            )
            .await?;

        tracker.finish();
        self.repo.complete(&job.id, &urls).await?;
        Ok(())
    }

    /// Enter `next`, writing the status only if it moves the record forward.
    async fn advance(
        &self,
        job_id: &JobId,
        tracker: &mut StageTracker,
        next: JobStatus,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        if next.ordinal() > tracker.stored.ordinal() {
            self.repo.update_status(job_id, next).await?;
            tracker.stored = next;
        } else {
            debug!(job_id = %job_id, stage = next.as_str(), stored = tracker.stored.as_str(), "Re-running passed stage");
        }
        tracker.enter(next);
        logger.log_stage(next);
        Ok(())
    }

    async fn record_failure(&self, job: &Job, err: &WorkerError, logger: &JobLogger) -> JobOutcome {
        logger.log_error(err);
        let category = err.category();
        metrics::record_failed(category.as_str());

        let message = err.user_message(self.settings.error_message_max_len);
        if let Err(e) = self.repo.fail(&job.id, &message).await {
            logger.log_persistence_error("mark failed", &e);
        } else if category == ErrorCategory::Persistence {
            logger.log_warning("Stage write failed but the failure was recorded");
        }
        JobOutcome::Failed(message)
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, job_id: &JobId) -> JobOutcome {
        let logger = JobLogger::new(job_id, "reel_pipeline");
        let span = logger.create_span();
        self.process(job_id, &logger).instrument(span).await
    }
}
