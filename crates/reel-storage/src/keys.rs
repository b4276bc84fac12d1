//! Object key layout: `jobs/{jobId}/{audio.mp3|subtitles.ass|video.mp4}`.

use reel_models::JobId;

/// The three durable artifacts of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Audio,
    Subtitles,
    Video,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Audio, ArtifactKind::Subtitles, ArtifactKind::Video];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio.mp3",
            ArtifactKind::Subtitles => "subtitles.ass",
            ArtifactKind::Video => "video.mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio/mpeg",
            ArtifactKind::Subtitles => "text/x-ssa",
            ArtifactKind::Video => "video/mp4",
        }
    }

    /// Parse a published file name. Anything else is rejected.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.file_name() == name)
    }
}

/// Storage key for a job artifact.
pub fn artifact_key(job_id: &JobId, kind: ArtifactKind) -> String {
    format!("jobs/{}/{}", job_id, kind.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_keys() {
        let id = JobId::from_string("abc");
        assert_eq!(artifact_key(&id, ArtifactKind::Audio), "jobs/abc/audio.mp3");
        assert_eq!(artifact_key(&id, ArtifactKind::Subtitles), "jobs/abc/subtitles.ass");
        assert_eq!(artifact_key(&id, ArtifactKind::Video), "jobs/abc/video.mp4");
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(ArtifactKind::from_file_name("video.mp4"), Some(ArtifactKind::Video));
        assert_eq!(ArtifactKind::from_file_name("../video.mp4"), None);
        assert_eq!(ArtifactKind::from_file_name("secrets.env"), None);
    }
}
