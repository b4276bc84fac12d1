//! Pipeline status state machine.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a job in the generation pipeline.
///
/// The happy path is linear, in declaration order. `Failed` is reachable from
/// every non-terminal status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a worker slot
    #[default]
    Pending,
    GeneratingScript,
    GeneratingVoice,
    FittingAudio,
    BuildingSubtitles,
    AssemblingVideo,
    Uploading,
    /// All artifacts uploaded
    Completed,
    /// Terminal failure, `error` is set
    Failed,
}

impl JobStatus {
    /// Linear pipeline order, excluding `Failed`.
    pub const PIPELINE: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::GeneratingScript,
        JobStatus::GeneratingVoice,
        JobStatus::FittingAudio,
        JobStatus::BuildingSubtitles,
        JobStatus::AssemblingVideo,
        JobStatus::Uploading,
        JobStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::GeneratingScript => "generating_script",
            JobStatus::GeneratingVoice => "generating_voice",
            JobStatus::FittingAudio => "fitting_audio",
            JobStatus::BuildingSubtitles => "building_subtitles",
            JobStatus::AssemblingVideo => "assembling_video",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Position along the linear pipeline. `Failed` sorts after everything.
    pub fn ordinal(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::GeneratingScript => 1,
            JobStatus::GeneratingVoice => 2,
            JobStatus::FittingAudio => 3,
            JobStatus::BuildingSubtitles => 4,
            JobStatus::AssemblingVideo => 5,
            JobStatus::Uploading => 6,
            JobStatus::Completed => 7,
            JobStatus::Failed => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// True for statuses left behind by an interrupted worker.
    pub fn is_recoverable(&self) -> bool {
        !self.is_terminal() && *self != JobStatus::Pending
    }

    /// Whether moving from `self` to `next` respects the state machine.
    ///
    /// Forward moves along the pipeline are allowed (skipping stages is fine,
    /// the script stage is skipped on resume), as is the jump to `Failed` from
    /// any non-terminal status. Nothing leaves a terminal status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || next.ordinal() > self.ordinal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "pending" => JobStatus::Pending,
            "generating_script" => JobStatus::GeneratingScript,
            "generating_voice" => JobStatus::GeneratingVoice,
            "fitting_audio" => JobStatus::FittingAudio,
            "building_subtitles" => JobStatus::BuildingSubtitles,
            "assembling_video" => JobStatus::AssemblingVideo,
            "uploading" => JobStatus::Uploading,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => return Err(UnknownStatus(other.to_string())),
        };
        Ok(status)
    }
}
