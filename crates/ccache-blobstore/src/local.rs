//! Directory-backed blob store
//!
//! Blobs live at `<root>/<container>/<blob>`. Access mode is ignored; the
//! filesystem permissions of `root` are the only access control.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{atomic_write_with, AccessMode, BlobClient, BlobStore, StoreError, StoreResult};

/// Blob store rooted at a local (or network-mounted) directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for LocalBlobStore {
    fn connect(&self, access: AccessMode) -> StoreResult<Box<dyn BlobClient>> {
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::MissingAccount);
        }
        debug!(root = %self.root.display(), %access, "opened local blob session");
        Ok(Box::new(LocalBlobClient {
            root: self.root.clone(),
        }))
    }
}

struct LocalBlobClient {
    root: PathBuf,
}

impl LocalBlobClient {
    fn blob_path(&self, container: &str, blob: &str) -> StoreResult<PathBuf> {
        if container.is_empty() {
            return Err(StoreError::MissingContainer);
        }
        let mut path = self.root.join(container);
        for segment in blob.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Ok(path)
    }
}

impl BlobClient for LocalBlobClient {
    fn download(&self, container: &str, blob: &str, dest: &Path) -> StoreResult<()> {
        let source = self.blob_path(container, blob)?;
        let mut reader = match File::open(&source) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    container: container.to_string(),
                    blob: blob.to_string(),
                });
            }
            Err(source_err) => {
                return Err(StoreError::Io {
                    path: source,
                    source: source_err,
                })
            }
        };

        atomic_write_with(dest, |out| {
            io::copy(&mut reader, out).map_err(|e| StoreError::Io {
                path: source.clone(),
                source: e,
            })
        })?;
        Ok(())
    }

    fn upload(&self, source: &Path, container: &str, blob: &str) -> StoreResult<()> {
        let dest = self.blob_path(container, blob)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut reader = File::open(source).map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        atomic_write_with(&dest, |out| {
            io::copy(&mut reader, out).map_err(|e| StoreError::Io {
                path: source.to_path_buf(),
                source: e,
            })
        })?;
        Ok(())
    }
}
