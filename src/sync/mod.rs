//! ccache synchronization engine
//!
//! `CCacheManager` owns the configuration, the cache layout and the two
//! collaborators (blob store, archiver). A build driver uses it as:
//!
//! 1. `initialize` once per build
//! 2. `set_package` + `download_pkg_group_ccache` before compiling a package
//! 3. `upload_pkg_group_ccache` after compiling, or `upload_all_groups` once
//!    at the end of the build
//!
//! The current package context is replaced wholesale by every `set_package`;
//! nothing carries over between packages.
//!
//! ## Locking
//!
//! Download and upload hold the `{arch, group}` lock for their full duration,
//! so parallel builds of packages from the same group serialize their cache
//! transfers.

mod download;
mod report;
mod upload;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ccache_blobstore::{store_for_settings, BlobStore};
use serde::Serialize;
use tracing::{debug, info};

use crate::archive::{Archiver, TarGzArchiver};
use crate::cancel::CancelFlag;
use crate::config::CCacheConfig;
use crate::error::{SyncError, SyncResult};
use crate::group::GroupIdentity;
use crate::lock::{GroupLock, DEFAULT_LOCK_TIMEOUT};
use crate::paths::{ArchivePaths, CacheLayout, RemoteFolders};

pub use report::{DownloadOutcome, DownloadReport, SkipReason, UploadOutcome, UploadReport};

/// Tunables for the sync engine
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How long to wait for a contended `{arch, group}` lock
    pub lock_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// The package (or sweep entry) currently being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageCacheContext {
    pub group: GroupIdentity,
    pub arch: String,
    pub cache_dir: PathBuf,
}

impl PackageCacheContext {
    /// Archive and tag paths for this context.
    pub fn archive_paths(&self, layout: &CacheLayout, folders: &RemoteFolders) -> ArchivePaths {
        ArchivePaths::derive(layout, &self.arch, self.group.name(), folders)
    }
}

/// Coordinates group cache downloads and uploads.
pub struct CCacheManager {
    config: CCacheConfig,
    layout: CacheLayout,
    store: Box<dyn BlobStore>,
    archiver: Box<dyn Archiver>,
    options: SyncOptions,
    cancel: CancelFlag,
    current: Option<PackageCacheContext>,
}

impl CCacheManager {
    /// Load the configuration and wire up the configured blob store and the
    /// tar+gzip archiver.
    pub fn initialize(config_path: &Path, root_dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let config = CCacheConfig::load(config_path)?;
        let store = store_for_settings(config.remote_store.store_settings());
        Ok(Self::new(
            config,
            root_dir,
            store,
            Box::new(TarGzArchiver::new()),
        ))
    }

    /// Build a manager from explicit collaborators.
    pub fn new(
        config: CCacheConfig,
        root_dir: impl Into<PathBuf>,
        store: Box<dyn BlobStore>,
        archiver: Box<dyn Archiver>,
    ) -> Self {
        let layout = CacheLayout::new(root_dir);
        info!(root = %layout.root().display(), "ccache manager initialized");
        Self {
            config,
            layout,
            store,
            archiver,
            options: SyncOptions::default(),
            cancel: CancelFlag::new(),
            current: None,
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CCacheConfig {
        &self.config
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Current package context, if any.
    pub fn context(&self) -> Option<&PackageCacheContext> {
        self.current.as_ref()
    }

    /// Select the package to operate on.
    ///
    /// Resolves its group and plans the cache directory. On failure the
    /// previous context is cleared.
    pub fn set_package(&mut self, package: &str, arch: &str) -> SyncResult<&PackageCacheContext> {
        let group = self.config.find_group(package);
        info!(package, arch, group = %group, "selected package");
        self.install_context(group, arch)
    }

    /// Select a group directly by name, as the sweep does.
    pub fn set_group(&mut self, arch: &str, group_name: &str) -> SyncResult<&PackageCacheContext> {
        let group = self.config.group_by_name(group_name);
        self.install_context(group, arch)
    }

    pub(crate) fn install_context(
        &mut self,
        group: GroupIdentity,
        arch: &str,
    ) -> SyncResult<&PackageCacheContext> {
        self.current = None;
        let cache_dir = self.layout.cache_dir(arch, group.name())?;
        debug!(cache_dir = %cache_dir.display(), "planned ccache directory");
        Ok(self.current.insert(PackageCacheContext {
            group,
            arch: arch.to_string(),
            cache_dir,
        }))
    }

    fn require_context(&self) -> SyncResult<PackageCacheContext> {
        self.current.clone().ok_or(SyncError::NoContext)
    }

    fn lock_group(&self, ctx: &PackageCacheContext) -> SyncResult<GroupLock> {
        let path = self.layout.lock_path(&ctx.arch, ctx.group.name())?;
        Ok(GroupLock::acquire(&path, self.options.lock_timeout)?)
    }

    fn remote_folders(&self) -> RemoteFolders {
        RemoteFolders::from_config(&self.config.remote_store)
    }
}

/// Create `dir` (and parents) if it does not exist.
fn ensure_dir(dir: &Path) -> SyncResult<()> {
    if dir.is_dir() {
        return Ok(());
    }
    debug!(dir = %dir.display(), "creating directory");
    fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
