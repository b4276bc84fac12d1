//! Recording FFmpeg backend for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{FfmpegBackend, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Records every command it is asked to run and succeeds unless a command
/// contains one of the configured failure tokens.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<Vec<String>>>,
    fail_tokens: Mutex<Vec<String>>,
    durations: Mutex<HashMap<PathBuf, f64>>,
    default_duration: f64,
    touch_outputs: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            default_duration: 30.0,
            ..Default::default()
        }
    }

    /// Duration returned for paths without an explicit entry.
    pub fn with_default_duration(mut self, secs: f64) -> Self {
        self.default_duration = secs;
        self
    }

    /// Create an empty file at each command's output path on success.
    pub fn touching_outputs(mut self) -> Self {
        self.touch_outputs = true;
        self
    }

    /// Fail any command whose arguments contain `token`.
    pub fn fail_when(self, token: impl Into<String>) -> Self {
        self.fail_tokens
            .lock()
            .expect("lock poisoned")
            .push(token.into());
        self
    }

    pub fn set_duration(&self, path: impl Into<PathBuf>, secs: f64) {
        self.durations
            .lock()
            .expect("lock poisoned")
            .insert(path.into(), secs);
    }

    /// Arguments of every command run so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Commands whose arguments contain `token`.
    pub fn calls_containing(&self, token: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.iter().any(|a| a.contains(token)))
            .collect()
    }
}

#[async_trait]
impl FfmpegBackend for RecordingBackend {
    async fn run(&self, cmd: &FfmpegCommand, _timeout: Option<Duration>) -> MediaResult<()> {
        let args = cmd.build_args();
        self.calls.lock().expect("lock poisoned").push(args.clone());

        let failing = {
            let tokens = self.fail_tokens.lock().expect("lock poisoned");
            tokens
                .iter()
                .find(|t| args.iter().any(|a| a.contains(t.as_str())))
                .cloned()
        };
        if let Some(token) = failing {
            return Err(MediaError::ffmpeg_failed(
                format!("simulated failure on {token}"),
                Some("simulated stderr".to_string()),
                Some(1),
            ));
        }

        if self.touch_outputs && cmd.output() != "-" {
            let out = Path::new(cmd.output());
            if let Some(parent) = out.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(out, b"").await?;
        }
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let durations = self.durations.lock().expect("lock poisoned");
        Ok(durations.get(path).copied().unwrap_or(self.default_duration))
    }
}
