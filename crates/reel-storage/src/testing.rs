//! In-memory object store for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ObjectStore;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct State {
    uploads: HashMap<String, PathBuf>,
    attempts: HashMap<String, u32>,
    failures: HashMap<String, u32>,
    unreachable: bool,
}

/// Records uploads and signs fake URLs. Failures can be injected per key.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` uploads of `key`.
    pub fn fail_next(&self, key: &str, count: u32) {
        self.state
            .lock()
            .expect("lock poisoned")
            .failures
            .insert(key.to_string(), count);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().expect("lock poisoned").unreachable = unreachable;
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("lock poisoned")
            .uploads
            .keys()
            .cloned()
            .collect()
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.state
            .lock()
            .expect("lock poisoned")
            .attempts
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        *state.attempts.entry(key.to_string()).or_default() += 1;

        if let Some(remaining) = state.failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::upload(key, "simulated upload failure"));
            }
        }

        state.uploads.insert(key.to_string(), path.to_path_buf());
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "https://storage.test/{}?expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        if self.state.lock().expect("lock poisoned").unreachable {
            return Err(StorageError::Unreachable("simulated outage".to_string()));
        }
        Ok(())
    }
}
