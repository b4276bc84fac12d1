//! Per-job scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use reel_models::JobId;

use crate::error::{WorkerError, WorkerResult};

/// `{work_dir}/{job_id}/` and the files a run writes there.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    dir: PathBuf,
}

impl JobWorkspace {
    pub fn new(root: &Path, job_id: &JobId) -> WorkerResult<Self> {
        let id = job_id.as_str();
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(WorkerError::internal(format!("unsafe job id for work dir: {:?}", id)));
        }
        Ok(Self { dir: root.join(id) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn voice_raw(&self) -> PathBuf {
        self.dir.join("voice_raw.mp3")
    }

    pub fn voice_fitted(&self) -> PathBuf {
        self.dir.join("voice_fitted.mp3")
    }

    pub fn subtitles(&self) -> PathBuf {
        self.dir.join("subtitles.ass")
    }

    pub fn video(&self) -> PathBuf {
        self.dir.join("video.mp4")
    }

    /// Start from an empty directory; leftovers of an interrupted run are removed.
    pub async fn prepare(&self) -> io::Result<()> {
        self.cleanup().await?;
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn cleanup(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_wipes_leftovers() {
        let root = TempDir::new().unwrap();
        let ws = JobWorkspace::new(root.path(), &JobId::from_string("job-1")).unwrap();
        tokio::fs::create_dir_all(ws.dir()).await.unwrap();
        tokio::fs::write(ws.video(), b"stale").await.unwrap();

        ws.prepare().await.unwrap();
        assert!(ws.dir().exists());
        assert!(!ws.video().exists());

        ws.cleanup().await.unwrap();
        assert!(!ws.dir().exists());
        // Second cleanup is a no-op
        ws.cleanup().await.unwrap();
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let root = Path::new("/tmp/reelforge");
        assert!(JobWorkspace::new(root, &JobId::from_string("../etc")).is_err());
        assert!(JobWorkspace::new(root, &JobId::from_string("")).is_err());
        let ws = JobWorkspace::new(root, &JobId::from_string("3f2a-9c")).unwrap();
        assert_eq!(ws.subtitles(), Path::new("/tmp/reelforge/3f2a-9c/subtitles.ass"));
    }
}
