//! In-memory blob store

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ccache_blobstore::{AccessMode, BlobClient, BlobStore, StoreError, StoreResult};

/// One observed interaction with the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Connect(AccessMode),
    Download {
        access: AccessMode,
        container: String,
        blob: String,
        dest: PathBuf,
    },
    Upload {
        access: AccessMode,
        container: String,
        blob: String,
        source: PathBuf,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    blobs: BTreeMap<String, Vec<u8>>,
    calls: Vec<StoreCall>,
    failing_access: HashSet<AccessMode>,
    failing_blobs: Vec<String>,
}

/// Blob store that keeps blobs in memory and records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingBlobStore {
    state: Arc<Mutex<StoreState>>,
}

fn key(container: &str, blob: &str) -> String {
    format!("{}/{}", container, blob)
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob.
    pub fn with_blob(self, container: &str, blob: &str, content: impl Into<Vec<u8>>) -> Self {
        self.put_blob(container, blob, content);
        self
    }

    pub fn put_blob(&self, container: &str, blob: &str, content: impl Into<Vec<u8>>) {
        self.lock().blobs.insert(key(container, blob), content.into());
    }

    /// Stored content of `container/blob`.
    pub fn blob(&self, container: &str, blob: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(&key(container, blob)).cloned()
    }

    /// Make every `connect` with `access` fail.
    pub fn fail_connect(&self, access: AccessMode) {
        self.lock().failing_access.insert(access);
    }

    /// Make every transfer whose blob name contains `pattern` fail.
    pub fn fail_blob(&self, pattern: impl Into<String>) {
        self.lock().failing_blobs.push(pattern.into());
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn connects(&self) -> Vec<AccessMode> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Connect(access) => Some(access),
                _ => None,
            })
            .collect()
    }

    /// Blob names downloaded, in order.
    pub fn downloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Download { blob, .. } => Some(blob),
                _ => None,
            })
            .collect()
    }

    /// Blob names uploaded, in order.
    pub fn uploads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Upload { blob, .. } => Some(blob),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlobStore for RecordingBlobStore {
    fn connect(&self, access: AccessMode) -> StoreResult<Box<dyn BlobClient>> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Connect(access));
        if state.failing_access.contains(&access) {
            return Err(StoreError::Auth(format!("injected {} connect failure", access)));
        }
        Ok(Box::new(RecordingBlobClient {
            state: Arc::clone(&self.state),
            access,
        }))
    }
}

struct RecordingBlobClient {
    state: Arc<Mutex<StoreState>>,
    access: AccessMode,
}

impl RecordingBlobClient {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected(state: &StoreState, container: &str, blob: &str) -> Option<StoreError> {
    state
        .failing_blobs
        .iter()
        .any(|pattern| blob.contains(pattern.as_str()))
        .then(|| StoreError::Status {
            status: 500,
            container: container.to_string(),
            blob: blob.to_string(),
        })
}

impl BlobClient for RecordingBlobClient {
    fn download(&self, container: &str, blob: &str, dest: &Path) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Download {
            access: self.access,
            container: container.to_string(),
            blob: blob.to_string(),
            dest: dest.to_path_buf(),
        });
        if let Some(err) = injected(&state, container, blob) {
            return Err(err);
        }
        let content = state
            .blobs
            .get(&key(container, blob))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            })?;
        drop(state);

        fs::write(dest, content).map_err(|source| StoreError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }

    fn upload(&self, source: &Path, container: &str, blob: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Upload {
            access: self.access,
            container: container.to_string(),
            blob: blob.to_string(),
            source: source.to_path_buf(),
        });
        if let Some(err) = injected(&state, container, blob) {
            return Err(err);
        }
        let content = fs::read(source).map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        state.blobs.insert(key(container, blob), content);
        Ok(())
    }
}
