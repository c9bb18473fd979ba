//! Archiver that records calls

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::archive::{ArchiveError, Archiver};

/// Content written by `RecordingArchiver::compress`
pub const PLACEHOLDER_ARCHIVE: &[u8] = b"recorded archive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveCall {
    Compress {
        dir: PathBuf,
        archive: PathBuf,
        /// Whether `archive` already existed when compress was called
        target_existed: bool,
    },
    Extract {
        archive: PathBuf,
        dir: PathBuf,
    },
}

#[derive(Debug, Default)]
struct ArchiverState {
    calls: Vec<ArchiveCall>,
    fail_compress: bool,
    fail_extract: bool,
}

/// Archiver double: compress writes a fixed placeholder file, extract only
/// creates the target directory.
#[derive(Debug, Clone, Default)]
pub struct RecordingArchiver {
    state: Arc<Mutex<ArchiverState>>,
}

impl RecordingArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_compress(&self) {
        self.lock().fail_compress = true;
    }

    pub fn fail_extract(&self) {
        self.lock().fail_extract = true;
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.lock().calls.clone()
    }

    pub fn compress_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ArchiveCall::Compress { .. }))
            .count()
    }

    pub fn extract_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ArchiveCall::Extract { .. }))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ArchiverState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Archiver for RecordingArchiver {
    fn compress(&self, dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
        let mut state = self.lock();
        state.calls.push(ArchiveCall::Compress {
            dir: dir.to_path_buf(),
            archive: archive.to_path_buf(),
            target_existed: archive.exists(),
        });
        let err = |source: io::Error| ArchiveError::Compress {
            dir: dir.to_path_buf(),
            archive: archive.to_path_buf(),
            source,
        };
        if state.fail_compress {
            return Err(err(io::Error::new(io::ErrorKind::Other, "injected failure")));
        }
        fs::write(archive, PLACEHOLDER_ARCHIVE).map_err(err)
    }

    fn extract(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
        let mut state = self.lock();
        state.calls.push(ArchiveCall::Extract {
            archive: archive.to_path_buf(),
            dir: dir.to_path_buf(),
        });
        let err = |source: io::Error| ArchiveError::Extract {
            archive: archive.to_path_buf(),
            dir: dir.to_path_buf(),
            source,
        };
        if state.fail_extract {
            return Err(err(io::Error::new(io::ErrorKind::Other, "injected failure")));
        }
        fs::create_dir_all(dir).map_err(err)
    }
}
