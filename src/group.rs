//! Package to cache group resolution
//!
//! Every package resolves to exactly one `GroupIdentity`. Packages that are
//! not listed in any group land in the implicit ungrouped bucket, which has
//! nobody to share a cache with and is therefore never synchronized.

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::{CCacheConfig, CacheGroup};

/// Directory name used for ungrouped packages
pub const COMMON_GROUP: &str = "common";

/// Minimum group size for which sharing (and the sweep upload) pays off
pub const MIN_SHARED_GROUP_SIZE: usize = 2;

/// Resolved cache group of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupIdentity {
    /// A group declared in configuration with its member count
    Explicit { name: String, size: usize },
    /// The implicit `common` bucket
    Ungrouped,
}

impl GroupIdentity {
    /// Group name as used in paths and blob names.
    pub fn name(&self) -> &str {
        match self {
            Self::Explicit { name, .. } => name,
            Self::Ungrouped => COMMON_GROUP,
        }
    }

    /// Declared member count (0 for the ungrouped bucket).
    pub fn size(&self) -> usize {
        match self {
            Self::Explicit { size, .. } => *size,
            Self::Ungrouped => 0,
        }
    }

    pub fn is_ungrouped(&self) -> bool {
        matches!(self, Self::Ungrouped)
    }

    /// True when at least two packages can share this cache.
    pub fn is_shared(&self) -> bool {
        self.size() >= MIN_SHARED_GROUP_SIZE
    }
}

impl fmt::Display for GroupIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.size())
    }
}

impl Serialize for GroupIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("GroupIdentity", 3)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("size", &self.size())?;
        state.serialize_field("ungrouped", &self.is_ungrouped())?;
        state.end()
    }
}

impl CCacheConfig {
    /// Resolve the cache group of a package.
    ///
    /// Groups and their members are scanned in configuration order and the
    /// first exact (case-sensitive) match wins.
    pub fn find_group(&self, package: &str) -> GroupIdentity {
        let found = self
            .groups
            .iter()
            .find(|group| group.package_names.iter().any(|p| p == package));

        match found {
            Some(group) => {
                debug!(package, group = %group.name, "found ccache group");
                identity_of(group)
            }
            None => {
                debug!(package, "no ccache group; using {}", COMMON_GROUP);
                GroupIdentity::Ungrouped
            }
        }
    }

    /// Look up a group by name, e.g. one discovered on disk.
    ///
    /// Unknown names resolve to `Ungrouped`.
    pub fn group_by_name(&self, name: &str) -> GroupIdentity {
        self.groups
            .iter()
            .find(|group| group.name == name)
            .map(identity_of)
            .unwrap_or(GroupIdentity::Ungrouped)
    }
}

/// A configured group named `common` shares the ungrouped directory and is
/// never synchronized.
fn identity_of(group: &CacheGroup) -> GroupIdentity {
    if group.name == COMMON_GROUP {
        return GroupIdentity::Ungrouped;
    }
    GroupIdentity::Explicit {
        name: group.name.clone(),
        size: group.package_names.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> CCacheConfig {
        CCacheConfig {
            groups: vec![
                CacheGroup {
                    name: "g1".to_string(),
                    package_names: vec!["pkgA".to_string(), "pkgB".to_string()],
                },
                CacheGroup {
                    name: "solo".to_string(),
                    package_names: vec!["lonely".to_string()],
                },
                CacheGroup {
                    name: "g2".to_string(),
                    package_names: vec![
                        "pkgB".to_string(),
                        "pkgC".to_string(),
                        "pkgD".to_string(),
                    ],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_find_group_member() {
        let config = make_config();
        assert_eq!(
            config.find_group("pkgA"),
            GroupIdentity::Explicit {
                name: "g1".to_string(),
                size: 2
            }
        );
        assert_eq!(config.find_group("pkgD").name(), "g2");
        assert_eq!(config.find_group("pkgD").size(), 3);
    }

    #[test]
    fn test_find_group_first_match_wins() {
        let config = make_config();
        assert_eq!(config.find_group("pkgB").name(), "g1");
    }

    #[test]
    fn test_find_group_unknown_is_ungrouped() {
        let config = make_config();
        let group = config.find_group("not-listed");
        assert!(group.is_ungrouped());
        assert_eq!(group.name(), "common");
        assert_eq!(group.size(), 0);
    }

    #[test]
    fn test_find_group_is_case_sensitive() {
        let config = make_config();
        assert!(config.find_group("PKGA").is_ungrouped());
        assert!(config.find_group("").is_ungrouped());
    }

    #[test]
    fn test_find_group_is_deterministic() {
        let config = make_config();
        for name in ["pkgA", "pkgB", "lonely", "unknown"] {
            assert_eq!(config.find_group(name), config.find_group(name));
        }
    }

    #[test]
    fn test_group_by_name() {
        let config = make_config();
        assert_eq!(config.group_by_name("g2").size(), 3);
        assert_eq!(config.group_by_name("solo").size(), 1);
        assert!(config.group_by_name("common").is_ungrouped());
        assert!(config.group_by_name("missing").is_ungrouped());
    }

    #[test]
    fn test_configured_common_group_is_ungrouped() {
        let config = CCacheConfig {
            groups: vec![CacheGroup {
                name: COMMON_GROUP.to_string(),
                package_names: vec!["p1".to_string(), "p2".to_string()],
            }],
            ..Default::default()
        };
        assert_eq!(config.find_group("p1"), GroupIdentity::Ungrouped);
        assert_eq!(config.group_by_name("common"), GroupIdentity::Ungrouped);
        assert!(!config.group_by_name("common").is_shared());
    }

    #[test]
    fn test_is_shared() {
        let config = make_config();
        assert!(config.group_by_name("g1").is_shared());
        assert!(!config.group_by_name("solo").is_shared());
        assert!(!GroupIdentity::Ungrouped.is_shared());
    }

    #[test]
    fn test_serialize_identity() {
        let json = serde_json::to_value(GroupIdentity::Ungrouped).unwrap();
        assert_eq!(json["name"], "common");
        assert_eq!(json["size"], 0);
        assert_eq!(json["ungrouped"], true);
    }
}
