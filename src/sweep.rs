//! End-of-build sweep
//!
//! Uploads every group cache found on disk. The directory tree is the only
//! record of which `{arch, group}` pairs were built:
//!
//! ```text
//! <root>
//!   <arch-1>
//!     <group-1>
//!     <group-2>
//!   <arch-2>
//!     <group-1>
//! ```
//!
//! Mapping directories to identities (`sweep_targets_from_relative_dirs`) and
//! deciding what to upload (`plan_sweep`) are pure; only
//! `discover_sweep_targets` and `CCacheManager::sweep` touch the filesystem.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::CCacheConfig;
use crate::error::{SyncError, SyncResult};
use crate::group::GroupIdentity;
use crate::sync::{CCacheManager, SkipReason, UploadOutcome, UploadReport};

/// An `{arch, group}` pair discovered on disk
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SweepTarget {
    pub arch: String,
    pub group: String,
}

impl SweepTarget {
    pub fn new(arch: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            group: group.into(),
        }
    }
}

/// Map directory paths relative to the cache root to sweep targets.
///
/// Only paths of exactly two plain components (`<arch>/<group>`) qualify.
/// The result is sorted and free of duplicates.
pub fn sweep_targets_from_relative_dirs<I, P>(dirs: I) -> Vec<SweepTarget>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut targets: Vec<SweepTarget> = dirs
        .into_iter()
        .filter_map(|dir| {
            let mut parts = Vec::with_capacity(2);
            for component in dir.as_ref().components() {
                match component {
                    Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                    _ => return None,
                }
            }
            match <[String; 2]>::try_from(parts) {
                Ok([arch, group]) => Some(SweepTarget { arch, group }),
                Err(_) => None,
            }
        })
        .collect();
    targets.sort();
    targets.dedup();
    targets
}

/// What the sweep does with a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    Upload,
    Skip(SkipReason),
}

/// A target with its configured identity and the planned action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepPlanEntry {
    pub target: SweepTarget,
    pub group: GroupIdentity,
    pub action: SweepAction,
}

/// Decide which targets to upload.
///
/// Groups with fewer than two members are skipped: they either cannot share
/// a cache or are the ungrouped bucket.
pub fn plan_sweep(config: &CCacheConfig, targets: &[SweepTarget]) -> Vec<SweepPlanEntry> {
    targets
        .iter()
        .map(|target| {
            let group = config.group_by_name(&target.group);
            let action = if group.is_ungrouped() {
                SweepAction::Skip(SkipReason::Ungrouped)
            } else if !group.is_shared() {
                SweepAction::Skip(SkipReason::NotShared)
            } else {
                SweepAction::Upload
            };
            SweepPlanEntry {
                target: target.clone(),
                group,
                action,
            }
        })
        .collect()
}

/// Targets found under a cache root, plus any enumeration failures
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub targets: Vec<SweepTarget>,
    pub errors: Vec<String>,
}

/// Walk `<root>/<arch>/<group>` directories.
///
/// Unreadable entries are reported in `errors` and do not stop the walk.
pub fn discover_sweep_targets(root: &Path) -> Discovery {
    let mut relative: Vec<PathBuf> = Vec::new();
    let mut errors = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() && entry.depth() == 2 => {
                if let Ok(rel) = entry.path().strip_prefix(root) {
                    relative.push(rel.to_path_buf());
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(root = %root.display(), error = %e, "failed to enumerate ccache directories");
                errors.push(e.to_string());
            }
        }
    }

    Discovery {
        targets: sweep_targets_from_relative_dirs(relative),
        errors,
    }
}

/// Per-target sweep result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    Skipped { reason: SkipReason },
    Uploaded { report: UploadReport },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepEntryReport {
    pub arch: String,
    pub group: String,
    pub size: usize,
    #[serde(flatten)]
    pub status: SweepStatus,
}

/// Summary of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<SweepEntryReport>,
    pub enumeration_errors: Vec<String>,
}

impl SweepReport {
    /// Upload attempts plus enumeration failures
    pub fn attempted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(e.status, SweepStatus::Skipped { .. }))
            .count()
            + self.enumeration_errors.len()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, SweepStatus::Failed { .. }))
            .count()
            + self.enumeration_errors.len()
    }

    pub fn uploaded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, SweepStatus::Uploaded { .. }))
            .count()
    }

    /// Turn any failure into `SweepFailed`.
    pub fn into_result(self) -> SyncResult<Self> {
        let failed = self.failed();
        if failed > 0 {
            return Err(SyncError::SweepFailed {
                failed,
                attempted: self.attempted(),
            });
        }
        Ok(self)
    }
}

impl CCacheManager {
    /// Upload every shared group cache found under the cache root.
    ///
    /// A failing group is logged and recorded; the remaining groups are still
    /// processed.
    pub fn sweep(&mut self) -> SweepReport {
        let started_at = Utc::now();
        let root = self.layout().root().to_path_buf();
        info!(root = %root.display(), "sweeping ccache directories");

        let discovery = discover_sweep_targets(&root);
        let plan = plan_sweep(self.config(), &discovery.targets);
        let mut entries = Vec::with_capacity(plan.len());

        for entry in plan {
            let SweepPlanEntry {
                target,
                group,
                action,
            } = entry;
            let size = group.size();
            info!(arch = %target.arch, group = %target.group, size, "found ccache group");

            let status = match action {
                SweepAction::Skip(reason) => {
                    info!(group = %target.group, "{}; skipping", reason.describe());
                    SweepStatus::Skipped { reason }
                }
                SweepAction::Upload => match self.upload_target(group, &target.arch) {
                    Ok(UploadOutcome::Uploaded(report)) => SweepStatus::Uploaded { report },
                    Ok(UploadOutcome::Skipped { reason }) => SweepStatus::Skipped { reason },
                    Err(e) => {
                        warn!(
                            arch = %target.arch,
                            group = %target.group,
                            error = %e,
                            "ccache will not be archived for this group"
                        );
                        SweepStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };

            entries.push(SweepEntryReport {
                arch: target.arch,
                group: target.group,
                size,
                status,
            });
        }

        let report = SweepReport {
            root,
            started_at,
            finished_at: Utc::now(),
            entries,
            enumeration_errors: discovery.errors,
        };
        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            "ccache sweep finished"
        );
        report
    }

    /// `sweep`, failing if any group could not be uploaded.
    pub fn upload_all_groups(&mut self) -> SyncResult<SweepReport> {
        self.sweep().into_result()
    }

    fn upload_target(&mut self, group: GroupIdentity, arch: &str) -> SyncResult<UploadOutcome> {
        self.install_context(group, arch)?;
        self.upload_pkg_group_ccache()
    }
}
