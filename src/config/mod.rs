//! ccache configuration
//!
//! Loads the remote-store settings and cache group membership once at
//! startup. JSON is the native format; files ending in `.toml` are parsed as
//! TOML with the same keys.
//!
//! Missing fields take zero values. Nothing is pre-validated here: an empty
//! store type, account or container surfaces as a transfer error when the
//! store is first used. `lint()` reports suspicious settings without changing
//! how packages resolve.

mod lint;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ccache_blobstore::{Credentials, StoreSettings};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

pub use lint::{ConfigWarning, WarningKind};

/// Errors from loading the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Remote blob store settings
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteStoreConfig {
    /// Store type (`azure-blob-storage` or `local`)
    #[serde(rename = "type")]
    pub kind: String,
    pub tenant_id: String,
    pub user_name: String,
    pub password: String,
    pub storage_account: String,
    pub container_name: String,
    /// Remote folder holding the per-group "latest" tag files
    #[serde(alias = "versionsFolder")]
    pub tags_folder: String,
    pub download_enabled: bool,
    /// Remote folder to download from, or `latest` to follow the tag file
    pub download_folder: String,
    pub upload_enabled: bool,
    pub upload_folder: String,
    /// Publish `upload_folder` as the new tag after a successful upload
    pub update_latest: bool,
    /// Overall timeout for a single blob transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_timeout_seconds: Option<u64>,
}

impl RemoteStoreConfig {
    /// Settings for building the blob store.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            kind: self.kind.clone(),
            account: self.storage_account.clone(),
            credentials: Credentials {
                tenant_id: self.tenant_id.clone(),
                client_id: self.user_name.clone(),
                client_secret: self.password.clone(),
            },
            transfer_timeout: self
                .transfer_timeout_seconds
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        }
    }

    /// Copy with the password masked, for logging and display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = "<redacted>".to_string();
        }
        copy
    }
}

impl fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = self.redacted();
        f.debug_struct("RemoteStoreConfig")
            .field("kind", &redacted.kind)
            .field("tenant_id", &redacted.tenant_id)
            .field("user_name", &redacted.user_name)
            .field("password", &redacted.password)
            .field("storage_account", &redacted.storage_account)
            .field("container_name", &redacted.container_name)
            .field("tags_folder", &redacted.tags_folder)
            .field("download_enabled", &redacted.download_enabled)
            .field("download_folder", &redacted.download_folder)
            .field("upload_enabled", &redacted.upload_enabled)
            .field("upload_folder", &redacted.upload_folder)
            .field("update_latest", &redacted.update_latest)
            .field("transfer_timeout_seconds", &redacted.transfer_timeout_seconds)
            .finish()
    }
}

/// A named set of packages sharing one cache directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheGroup {
    pub name: String,
    pub package_names: Vec<String>,
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CCacheConfig {
    pub remote_store: RemoteStoreConfig,
    pub groups: Vec<CacheGroup>,
}

impl CCacheConfig {
    /// Load the configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "loading ccache configuration");

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = if is_toml(path) {
            let text = std::str::from_utf8(&bytes).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            })?;
            Self::from_toml_str(text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        };

        let digest = hex::encode(Sha256::digest(&bytes));
        config.log_summary(&digest);
        Ok(config)
    }

    /// Parse from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn log_summary(&self, digest: &str) {
        let remote = self.remote_store.redacted();
        info!(
            digest,
            store_type = %remote.kind,
            tenant_id = %remote.tenant_id,
            user_name = %remote.user_name,
            storage_account = %remote.storage_account,
            container = %remote.container_name,
            tags_folder = %remote.tags_folder,
            download_enabled = remote.download_enabled,
            download_folder = %remote.download_folder,
            upload_enabled = remote.upload_enabled,
            upload_folder = %remote.upload_folder,
            update_latest = remote.update_latest,
            groups = self.groups.len(),
            "loaded ccache configuration"
        );
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}
