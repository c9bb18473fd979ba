//! Error types for cache synchronization

use std::io;
use std::path::{Path, PathBuf};

use ccache_blobstore::StoreError;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::lock::LockError;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    ConfigLoad(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transfer failed: {0}")]
    Transfer(#[from] StoreError),

    #[error("archive operation failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("cache lock failed: {0}")]
    Lock(#[from] LockError),

    #[error("tag blob {blob} is empty")]
    EmptyTag { blob: String },

    #[error("no package selected; call set_package first")]
    NoContext,

    #[error("operation cancelled")]
    Cancelled,

    #[error("{failed} of {attempted} ccache group operations failed; see warnings above")]
    SweepFailed { failed: usize, attempted: usize },
}

impl SyncError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
