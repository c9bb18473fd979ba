//! Local and remote path planning
//!
//! Layout on disk, relative to the cache root `<root>`:
//!
//! ```text
//! <root>/<arch>/<group>/                      shared ccache directory
//! <root>-downloads/<group>-ccache.tar.gz      downloaded archive
//! <root>-downloads/<group>-latest-build.txt   downloaded tag
//! <root>-uploads/<group>-ccache.tar.gz        archive to upload
//! <root>-uploads/<group>-latest-build.txt     tag to upload
//! <root>-locks/<arch>/<group>.lock            per-group lock
//! ```
//!
//! Remote blobs: `<arch>/<folder>/<group>-ccache.tar.gz` and
//! `<arch>/<tags folder>/<group>-latest-build.txt`.
//!
//! Everything here is a pure function of its inputs.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::config::RemoteStoreConfig;
use crate::error::{SyncError, SyncResult};

/// Suffix of the archive file and blob
pub const TAR_SUFFIX: &str = "-ccache.tar.gz";

/// Suffix of the tag file and blob
pub const TAG_SUFFIX: &str = "-latest-build.txt";

/// Download folder value that means "follow the tag file"
pub const LATEST_MARKER: &str = "latest";

/// Plan the shared cache directory for `{arch, group}`.
///
/// Both components must be non-empty single path segments.
pub fn plan_cache_dir(root: &Path, arch: &str, group: &str) -> SyncResult<PathBuf> {
    validate_segment("architecture", arch)?;
    validate_segment("group name", group)?;
    Ok(root.join(arch).join(group))
}

pub(crate) fn validate_segment(what: &str, value: &str) -> SyncResult<()> {
    if value.is_empty() {
        return Err(SyncError::InvalidArgument(format!("{} must not be empty", what)));
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(SyncError::InvalidArgument(format!(
            "{} must be a single path segment, got {:?}",
            what, value
        )));
    }
    Ok(())
}

/// Directory layout rooted at the cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        // Normalize away trailing separators so sibling names stay adjacent.
        let root: PathBuf = root.into();
        let normalized: PathBuf = root
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let root = if normalized.as_os_str().is_empty() {
            root
        } else {
            normalized
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self, arch: &str, group: &str) -> SyncResult<PathBuf> {
        plan_cache_dir(&self.root, arch, group)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.sibling("-downloads")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.sibling("-uploads")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.sibling("-locks")
    }

    /// Lock file guarding `{arch, group}`.
    pub fn lock_path(&self, arch: &str, group: &str) -> SyncResult<PathBuf> {
        validate_segment("architecture", arch)?;
        validate_segment("group name", group)?;
        Ok(self.locks_dir().join(arch).join(format!("{}.lock", group)))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.root.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Remote folder names used to build blob paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFolders {
    pub download: String,
    pub upload: String,
    pub tags: String,
}

impl RemoteFolders {
    pub fn from_config(remote: &RemoteStoreConfig) -> Self {
        Self {
            download: remote.download_folder.clone(),
            upload: remote.upload_folder.clone(),
            tags: remote.tags_folder.clone(),
        }
    }

    /// Same folders with a different download folder.
    pub fn with_download(&self, download: impl Into<String>) -> Self {
        Self {
            download: download.into(),
            ..self.clone()
        }
    }

    /// True when the download folder must be resolved through the tag file.
    pub fn follows_latest(&self) -> bool {
        self.download == LATEST_MARKER
    }
}

/// Local and remote locations of one transferred file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferPaths {
    /// Where a download lands
    pub local_source: PathBuf,
    /// Blob a download reads
    pub remote_source: String,
    /// File an upload reads
    pub local_target: PathBuf,
    /// Blob an upload writes
    pub remote_target: String,
}

/// Paths for the archive and the tag file of one `{arch, group}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivePaths {
    pub tar: TransferPaths,
    pub tag: TransferPaths,
}

impl ArchivePaths {
    /// Derive all archive and tag paths.
    ///
    /// Must be re-derived whenever `folders.download` changes.
    pub fn derive(layout: &CacheLayout, arch: &str, group: &str, folders: &RemoteFolders) -> Self {
        let downloads = layout.downloads_dir();
        let uploads = layout.uploads_dir();

        let tar_name = format!("{}{}", group, TAR_SUFFIX);
        let tag_name = format!("{}{}", group, TAG_SUFFIX);

        Self {
            tar: TransferPaths {
                local_source: downloads.join(&tar_name),
                remote_source: blob_name(arch, &folders.download, &tar_name),
                local_target: uploads.join(&tar_name),
                remote_target: blob_name(arch, &folders.upload, &tar_name),
            },
            tag: TransferPaths {
                local_source: downloads.join(&tag_name),
                remote_source: blob_name(arch, &folders.tags, &tag_name),
                local_target: uploads.join(&tag_name),
                remote_target: blob_name(arch, &folders.tags, &tag_name),
            },
        }
    }
}

fn blob_name(arch: &str, folder: &str, file: &str) -> String {
    format!("{}/{}/{}", arch, folder, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders() -> RemoteFolders {
        RemoteFolders {
            download: "2024-01-01".to_string(),
            upload: "build-42".to_string(),
            tags: "tags".to_string(),
        }
    }

    #[test]
    fn test_plan_cache_dir() {
        let dir = plan_cache_dir(Path::new("/cache"), "x86_64", "g1").unwrap();
        assert_eq!(dir, PathBuf::from("/cache/x86_64/g1"));
    }

    #[test]
    fn test_plan_cache_dir_rejects_empty() {
        assert!(matches!(
            plan_cache_dir(Path::new("/cache"), "", "g1"),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan_cache_dir(Path::new("/cache"), "x86_64", ""),
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_plan_cache_dir_rejects_traversal() {
        assert!(plan_cache_dir(Path::new("/cache"), "..", "g1").is_err());
        assert!(plan_cache_dir(Path::new("/cache"), "x86_64", "a/b").is_err());
    }

    #[test]
    fn test_layout_siblings() {
        let layout = CacheLayout::new("/cache");
        assert_eq!(layout.downloads_dir(), PathBuf::from("/cache-downloads"));
        assert_eq!(layout.uploads_dir(), PathBuf::from("/cache-uploads"));
        assert_eq!(layout.locks_dir(), PathBuf::from("/cache-locks"));
    }

    #[test]
    fn test_layout_ignores_trailing_separator() {
        let layout = CacheLayout::new("/cache/");
        assert_eq!(layout.root(), Path::new("/cache"));
        assert_eq!(layout.uploads_dir(), PathBuf::from("/cache-uploads"));
    }

    #[test]
    fn test_lock_path() {
        let layout = CacheLayout::new("/cache");
        assert_eq!(
            layout.lock_path("aarch64", "g1").unwrap(),
            PathBuf::from("/cache-locks/aarch64/g1.lock")
        );
    }

    #[test]
    fn test_derive_archive_paths() {
        let layout = CacheLayout::new("/cache");
        let paths = ArchivePaths::derive(&layout, "x86_64", "g1", &folders());

        assert_eq!(
            paths.tar.local_source,
            PathBuf::from("/cache-downloads/g1-ccache.tar.gz")
        );
        assert_eq!(paths.tar.remote_source, "x86_64/2024-01-01/g1-ccache.tar.gz");
        assert_eq!(
            paths.tar.local_target,
            PathBuf::from("/cache-uploads/g1-ccache.tar.gz")
        );
        assert_eq!(paths.tar.remote_target, "x86_64/build-42/g1-ccache.tar.gz");

        assert_eq!(
            paths.tag.local_source,
            PathBuf::from("/cache-downloads/g1-latest-build.txt")
        );
        assert_eq!(
            paths.tag.local_target,
            PathBuf::from("/cache-uploads/g1-latest-build.txt")
        );
        assert_eq!(paths.tag.remote_source, "x86_64/tags/g1-latest-build.txt");
        assert_eq!(paths.tag.remote_source, paths.tag.remote_target);
    }

    #[test]
    fn test_derive_is_pure() {
        let layout = CacheLayout::new("/cache");
        let a = ArchivePaths::derive(&layout, "x86_64", "g1", &folders());
        let b = ArchivePaths::derive(&layout, "x86_64", "g1", &folders());
        assert_eq!(a, b);
    }

    #[test]
    fn test_changing_download_folder_only_moves_download_blob() {
        let layout = CacheLayout::new("/cache");
        let before = ArchivePaths::derive(&layout, "x86_64", "g1", &folders());
        let after = ArchivePaths::derive(
            &layout,
            "x86_64",
            "g1",
            &folders().with_download("2024-02-02"),
        );

        assert_ne!(before.tar.remote_source, after.tar.remote_source);
        assert_eq!(after.tar.remote_source, "x86_64/2024-02-02/g1-ccache.tar.gz");

        assert_eq!(before.tar.remote_target, after.tar.remote_target);
        assert_eq!(before.tar.local_source, after.tar.local_source);
        assert_eq!(before.tar.local_target, after.tar.local_target);
        assert_eq!(before.tag, after.tag);
    }

    #[test]
    fn test_follows_latest() {
        assert!(folders().with_download("latest").follows_latest());
        assert!(!folders().follows_latest());
    }
}
