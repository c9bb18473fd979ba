//! Outcome records for sync operations

use std::path::PathBuf;

use serde::Serialize;

/// Why a sync step did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Package is in the implicit `common` bucket
    Ungrouped,
    /// `downloadEnabled` is false
    DownloadDisabled,
    /// `uploadEnabled` is false
    UploadDisabled,
    /// Cache directory has no subdirectories; the compiler never used it
    EmptyCacheDir,
    /// Group has fewer than two members (sweep only)
    NotShared,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ungrouped => "package is not in a ccache group",
            Self::DownloadDisabled => "downloading ccache archives is disabled",
            Self::UploadDisabled => "uploading ccache archives is disabled",
            Self::EmptyCacheDir => "ccache directory was never populated",
            Self::NotShared => "group has fewer than two members",
        }
    }
}

/// Details of a completed download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub arch: String,
    pub group: String,
    /// Remote folder the archive came from (after tag resolution)
    pub remote_folder: String,
    /// Whether the folder was read from the tag blob
    pub followed_tag: bool,
    pub remote_archive: String,
    pub local_archive: PathBuf,
    pub cache_dir: PathBuf,
    pub archive_bytes: u64,
    pub download_ms: u64,
    pub extract_ms: u64,
}

/// Result of `download_pkg_group_ccache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Skipped { reason: SkipReason },
    Downloaded(DownloadReport),
}

impl DownloadOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn report(&self) -> Option<&DownloadReport> {
        match self {
            Self::Downloaded(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

/// Details of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub arch: String,
    pub group: String,
    pub remote_archive: String,
    pub local_archive: PathBuf,
    pub archive_bytes: u64,
    pub archive_sha256: String,
    /// Tag blob published, if `updateLatest` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_tag: Option<String>,
    pub compress_ms: u64,
    pub upload_ms: u64,
}

/// Result of `upload_pkg_group_ccache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Skipped { reason: SkipReason },
    Uploaded(UploadReport),
}

impl UploadOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn report(&self) -> Option<&UploadReport> {
        match self {
            Self::Uploaded(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_outcome_serialization() {
        let outcome = DownloadOutcome::Skipped {
            reason: SkipReason::DownloadDisabled,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "download_disabled");
        assert!(outcome.is_skipped());
        assert!(outcome.report().is_none());
    }

    #[test]
    fn test_uploaded_outcome_serialization() {
        let outcome = UploadOutcome::Uploaded(UploadReport {
            arch: "x86_64".to_string(),
            group: "g1".to_string(),
            remote_archive: "x86_64/build-42/g1-ccache.tar.gz".to_string(),
            local_archive: PathBuf::from("/cache-uploads/g1-ccache.tar.gz"),
            archive_bytes: 10,
            archive_sha256: "ab".repeat(32),
            published_tag: None,
            compress_ms: 1,
            upload_ms: 2,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["remote_archive"], "x86_64/build-42/g1-ccache.tar.gz");
        assert!(json.get("published_tag").is_none());
    }
}
