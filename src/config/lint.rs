//! Configuration lint checks
//!
//! Resolution never depends on these: a package listed in two groups still
//! resolves to the first one. The `verify` command prints them so config
//! authors can fix the file.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use super::CCacheConfig;
use crate::group::COMMON_GROUP;

/// Kind of configuration warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Package listed in more than one group
    PackageInMultipleGroups,
    /// Two groups share a name
    DuplicateGroupName,
    /// Group uses the reserved ungrouped name
    ReservedGroupName,
    /// Group cannot benefit from sharing
    SingleMemberGroup,
    /// Group name is empty
    EmptyGroupName,
    /// Remote store field required for transfers is empty
    MissingRemoteField,
}

/// A single lint finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl ConfigWarning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl CCacheConfig {
    /// Report suspicious settings.
    pub fn lint(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let mut seen_names = HashSet::new();
        let mut memberships: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for group in &self.groups {
            if group.name.is_empty() {
                warnings.push(ConfigWarning::new(
                    WarningKind::EmptyGroupName,
                    "group with an empty name",
                ));
            } else if !seen_names.insert(group.name.as_str()) {
                warnings.push(ConfigWarning::new(
                    WarningKind::DuplicateGroupName,
                    format!("group '{}' is defined more than once", group.name),
                ));
            }

            if group.name == COMMON_GROUP {
                warnings.push(ConfigWarning::new(
                    WarningKind::ReservedGroupName,
                    format!(
                        "group name '{}' is reserved for ungrouped packages; it is never synced",
                        COMMON_GROUP
                    ),
                ));
            }

            if group.package_names.len() < 2 {
                warnings.push(ConfigWarning::new(
                    WarningKind::SingleMemberGroup,
                    format!(
                        "group '{}' has {} member(s); it is skipped by the end-of-build sweep",
                        group.name,
                        group.package_names.len()
                    ),
                ));
            }

            for package in &group.package_names {
                let groups = memberships.entry(package.as_str()).or_default();
                if !groups.contains(&group.name.as_str()) {
                    groups.push(group.name.as_str());
                }
            }
        }

        for (package, groups) in memberships {
            if groups.len() > 1 {
                warnings.push(ConfigWarning::new(
                    WarningKind::PackageInMultipleGroups,
                    format!(
                        "package '{}' is listed in groups [{}]; '{}' wins",
                        package,
                        groups.join(", "),
                        groups[0]
                    ),
                ));
            }
        }

        let remote = &self.remote_store;
        if remote.download_enabled || remote.upload_enabled {
            for (field, value) in [
                ("type", &remote.kind),
                ("storageAccount", &remote.storage_account),
                ("containerName", &remote.container_name),
            ] {
                if value.is_empty() {
                    warnings.push(ConfigWarning::new(
                        WarningKind::MissingRemoteField,
                        format!("remoteStore.{} is empty but transfers are enabled", field),
                    ));
                }
            }
            let uses_tags = remote.update_latest
                || remote.download_folder == crate::paths::LATEST_MARKER;
            if uses_tags && remote.tags_folder.is_empty() {
                warnings.push(ConfigWarning::new(
                    WarningKind::MissingRemoteField,
                    "remoteStore.tagsFolder is empty but the latest tag is in use",
                ));
            }
        }

        warnings
    }
}
