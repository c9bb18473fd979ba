//! Upload-after-build

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Instant;

use ccache_blobstore::AccessMode;
use sha2::{Digest, Sha256};
use tracing::info;
use walkdir::WalkDir;

use super::{elapsed_ms, ensure_dir, CCacheManager, SkipReason, UploadOutcome, UploadReport};
use crate::error::{SyncError, SyncResult};

impl CCacheManager {
    /// Archive and publish the current package's group cache.
    ///
    /// The archive is uploaded before the tag that points at it, so a reader
    /// following `latest` never lands on a folder without an archive.
    pub fn upload_pkg_group_ccache(&self) -> SyncResult<UploadOutcome> {
        let ctx = self.require_context()?;
        info!(arch = %ctx.arch, group = %ctx.group, "finalizing ccache directory");

        if ctx.group.is_ungrouped() {
            info!("ungrouped package; skipping upload");
            return Ok(UploadOutcome::Skipped {
                reason: SkipReason::Ungrouped,
            });
        }

        if !has_subdirectories(&ctx.cache_dir)? {
            info!(dir = %ctx.cache_dir.display(), "ccache directory is empty; skipping upload");
            return Ok(UploadOutcome::Skipped {
                reason: SkipReason::EmptyCacheDir,
            });
        }

        let remote = &self.config.remote_store;
        if !remote.upload_enabled {
            info!("ccache upload is disabled; skipping");
            return Ok(UploadOutcome::Skipped {
                reason: SkipReason::UploadDisabled,
            });
        }

        self.cancel.check()?;
        let _lock = self.lock_group(&ctx)?;
        ensure_dir(&self.layout.uploads_dir())?;

        let paths = ctx.archive_paths(&self.layout, &self.remote_folders());

        remove_stale(&paths.tar.local_target)?;
        info!(
            dir = %ctx.cache_dir.display(),
            archive = %paths.tar.local_target.display(),
            "compressing ccache directory"
        );
        let start = Instant::now();
        self.archiver.compress(&ctx.cache_dir, &paths.tar.local_target)?;
        let compress_ms = elapsed_ms(start);
        let (archive_bytes, archive_sha256) = digest_file(&paths.tar.local_target)?;
        info!(compress_ms, archive_bytes, sha256 = %archive_sha256, "compressed ccache directory");

        self.cancel.check()?;
        let client = self.store.connect(AccessMode::Authenticated)?;

        info!(
            archive = %paths.tar.local_target.display(),
            blob = %paths.tar.remote_target,
            "uploading ccache archive"
        );
        let start = Instant::now();
        client.upload(
            &paths.tar.local_target,
            &remote.container_name,
            &paths.tar.remote_target,
        )?;
        let upload_ms = elapsed_ms(start);
        info!(upload_ms, "uploaded ccache archive");

        let published_tag = if remote.update_latest {
            self.cancel.check()?;
            info!(
                folder = %remote.upload_folder,
                blob = %paths.tag.remote_target,
                "publishing latest tag"
            );
            fs::write(&paths.tag.local_target, remote.upload_folder.as_bytes())
                .map_err(|e| SyncError::io(&paths.tag.local_target, e))?;
            client.upload(
                &paths.tag.local_target,
                &remote.container_name,
                &paths.tag.remote_target,
            )?;
            Some(paths.tag.remote_target.clone())
        } else {
            None
        };

        Ok(UploadOutcome::Uploaded(UploadReport {
            arch: ctx.arch.clone(),
            group: ctx.group.name().to_string(),
            remote_archive: paths.tar.remote_target,
            local_archive: paths.tar.local_target,
            archive_bytes,
            archive_sha256,
            published_tag,
            compress_ms,
            upload_ms,
        }))
    }
}

/// True if `dir` exists and contains at least one directory.
fn has_subdirectories(dir: &Path) -> SyncResult<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| SyncError::io(dir, io::Error::from(e)))?;
        if entry.file_type().is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Remove an archive left over from an earlier run.
fn remove_stale(path: &Path) -> SyncResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed stale ccache archive");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

fn digest_file(path: &Path) -> SyncResult<(u64, String)> {
    let mut file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut file, &mut hasher).map_err(|e| SyncError::io(path, e))?;
    Ok((bytes, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_has_subdirectories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("g1");
        assert!(!has_subdirectories(&dir).unwrap());

        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ccache.conf"), "").unwrap();
        assert!(!has_subdirectories(&dir).unwrap());

        fs::create_dir_all(dir.join("0")).unwrap();
        assert!(has_subdirectories(&dir).unwrap());
    }

    #[test]
    fn test_remove_stale() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("g1-ccache.tar.gz");
        remove_stale(&path).unwrap();

        fs::write(&path, "old").unwrap();
        remove_stale(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_digest_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a");
        fs::write(&path, "hello").unwrap();
        let (bytes, sha) = digest_file(&path).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(
            sha,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
