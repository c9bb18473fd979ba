//! Download-before-build

use std::fs;
use std::path::Path;
use std::time::Instant;

use ccache_blobstore::AccessMode;
use tracing::info;

use super::{elapsed_ms, ensure_dir, CCacheManager, DownloadOutcome, DownloadReport, SkipReason};
use crate::error::{SyncError, SyncResult};
use crate::paths::validate_segment;

impl CCacheManager {
    /// Fetch and unpack the current package's group cache.
    ///
    /// The cache directory is always created, even when nothing is
    /// downloaded. When the configured download folder is `latest`, the
    /// group's tag blob is read first and its content names the folder to
    /// download from.
    pub fn download_pkg_group_ccache(&self) -> SyncResult<DownloadOutcome> {
        let ctx = self.require_context()?;
        info!(arch = %ctx.arch, group = %ctx.group, "preparing ccache directory");

        ensure_dir(&ctx.cache_dir)?;

        if ctx.group.is_ungrouped() {
            info!("ungrouped package; skipping download");
            return Ok(DownloadOutcome::Skipped {
                reason: SkipReason::Ungrouped,
            });
        }

        let remote = &self.config.remote_store;
        if !remote.download_enabled {
            info!("ccache download is disabled; skipping");
            return Ok(DownloadOutcome::Skipped {
                reason: SkipReason::DownloadDisabled,
            });
        }

        self.cancel.check()?;
        let _lock = self.lock_group(&ctx)?;
        ensure_dir(&self.layout.downloads_dir())?;

        let client = self.store.connect(AccessMode::Anonymous)?;

        let mut folders = self.remote_folders();
        let mut paths = ctx.archive_paths(&self.layout, &folders);
        let followed_tag = folders.follows_latest();

        if followed_tag {
            self.cancel.check()?;
            info!(
                blob = %paths.tag.remote_source,
                dest = %paths.tag.local_source.display(),
                "downloading latest tag"
            );
            client.download(
                &remote.container_name,
                &paths.tag.remote_source,
                &paths.tag.local_source,
            )?;

            let folder = read_tag(&paths.tag.local_source, &paths.tag.remote_source)?;
            info!(folder = %folder, "latest ccache folder resolved");
            folders = folders.with_download(folder);
            paths = ctx.archive_paths(&self.layout, &folders);
        }

        self.cancel.check()?;
        info!(
            blob = %paths.tar.remote_source,
            dest = %paths.tar.local_source.display(),
            "downloading ccache archive"
        );
        let start = Instant::now();
        client.download(
            &remote.container_name,
            &paths.tar.remote_source,
            &paths.tar.local_source,
        )?;
        let download_ms = elapsed_ms(start);
        let archive_bytes = fs::metadata(&paths.tar.local_source)
            .map_err(|e| SyncError::io(&paths.tar.local_source, e))?
            .len();
        info!(download_ms, archive_bytes, "downloaded ccache archive");

        self.cancel.check()?;
        info!(
            archive = %paths.tar.local_source.display(),
            dir = %ctx.cache_dir.display(),
            "extracting ccache archive"
        );
        let start = Instant::now();
        self.archiver.extract(&paths.tar.local_source, &ctx.cache_dir)?;
        let extract_ms = elapsed_ms(start);
        info!(extract_ms, "extracted ccache archive");

        Ok(DownloadOutcome::Downloaded(DownloadReport {
            arch: ctx.arch.clone(),
            group: ctx.group.name().to_string(),
            remote_folder: folders.download,
            followed_tag,
            remote_archive: paths.tar.remote_source,
            local_archive: paths.tar.local_source,
            cache_dir: ctx.cache_dir,
            archive_bytes,
            download_ms,
            extract_ms,
        }))
    }
}

/// Read the folder name stored in a downloaded tag file.
///
/// The folder must be a single path segment.
fn read_tag(path: &Path, blob: &str) -> SyncResult<String> {
    let content = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    let folder = content.trim();
    if folder.is_empty() {
        return Err(SyncError::EmptyTag {
            blob: blob.to_string(),
        });
    }
    validate_segment("tag folder", folder)?;
    Ok(folder.to_string())
}
