//! Background video catalog: `{root}/{category}/{30|60}/*.{mp4,mov,webm,avi,mkv}`.

use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use reel_models::{BackgroundCategory, TargetDuration};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Extensions accepted as background media.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv"];

/// Number of clips available for one category/duration pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub category: String,
    pub duration: String,
    pub clips: usize,
}

/// Read access to the pre-populated background directory tree.
#[derive(Debug, Clone)]
pub struct BackgroundCatalog {
    root: PathBuf,
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl BackgroundCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding clips for a category and duration.
    pub fn dir_for(&self, category: &BackgroundCategory, duration: TargetDuration) -> PathBuf {
        self.root
            .join(category.as_str())
            .join(duration.as_secs().to_string())
    }

    /// All usable clips, sorted by path. Missing or empty directories are errors.
    pub async fn list(
        &self,
        category: &BackgroundCategory,
        duration: TargetDuration,
    ) -> MediaResult<Vec<PathBuf>> {
        let not_found = || MediaError::BackgroundNotFound {
            category: category.to_string(),
            duration: duration.as_secs(),
        };

        let dir = self.dir_for(category, duration);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_video_file(&path) {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(not_found());
        }
        files.sort();
        Ok(files)
    }

    /// Pick one clip uniformly at random.
    pub async fn pick_random(
        &self,
        category: &BackgroundCategory,
        duration: TargetDuration,
    ) -> MediaResult<PathBuf> {
        let files = self.list(category, duration).await?;
        let chosen = files
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| MediaError::internal("empty background list"))?;
        debug!(
            category = %category,
            candidates = files.len(),
            "Selected background {}",
            chosen.display()
        );
        Ok(chosen)
    }

    /// Clip counts for every `{category}/{duration}` directory.
    pub async fn inventory(&self) -> MediaResult<Vec<CatalogEntry>> {
        let mut result = Vec::new();
        let mut categories = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => return Err(e.into()),
        };

        while let Some(category) = categories.next_entry().await? {
            if !category.file_type().await?.is_dir() {
                continue;
            }
            let mut durations = tokio::fs::read_dir(category.path()).await?;
            while let Some(duration) = durations.next_entry().await? {
                if !duration.file_type().await?.is_dir() {
                    continue;
                }
                let clips = count_matching(&duration.path(), is_video_file).await?;
                result.push(CatalogEntry {
                    category: category.file_name().to_string_lossy().to_string(),
                    duration: duration.file_name().to_string_lossy().to_string(),
                    clips,
                });
            }
        }

        result.sort_by(|a, b| (&a.category, &a.duration).cmp(&(&b.category, &b.duration)));
        Ok(result)
    }
}

/// Count files in `dir` accepted by `filter`. A missing directory counts as zero.
pub async fn count_matching(dir: &Path, filter: fn(&Path) -> bool) -> MediaResult<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && filter(&entry.path()) {
            count += 1;
        }
    }
    Ok(count)
}
