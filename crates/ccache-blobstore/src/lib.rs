//! Blob store sessions for ccache-sync
//!
//! Abstracts the remote store behind two small traits so the sync engine can
//! be exercised without a network:
//! - `BlobStore`: opens a session with a given access mode
//! - `BlobClient`: downloads and uploads single blobs within a session
//!
//! Backends:
//! - `AzureBlobStore`: Azure Blob Storage REST API (anonymous reads,
//!   client-credential writes)
//! - `LocalBlobStore`: a plain directory, `<root>/<container>/<blob>`
//! - `UnsupportedStore`: stands in for an unknown store type; every session
//!   fails

mod azure;
mod local;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use azure::AzureBlobStore;
pub use local::LocalBlobStore;

/// Store type name for Azure Blob Storage
pub const AZURE_STORE_TYPE: &str = "azure-blob-storage";

/// Store type name for the local directory backend
pub const LOCAL_STORE_TYPE: &str = "local";

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from blob store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported blob store type: {0:?}")]
    UnsupportedStoreType(String),

    #[error("storage account is not configured")]
    MissingAccount,

    #[error("container name is not configured")]
    MissingContainer,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("blob not found: {container}/{blob}")]
    NotFound { container: String, blob: String },

    #[error("server returned status {status} for {container}/{blob}")]
    Status {
        status: u16,
        container: String,
        blob: String,
    },

    #[error("transport error for {container}/{blob}: {message}")]
    Transport {
        container: String,
        blob: String,
        message: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Access mode for a blob store session.
///
/// Downloads use anonymous (read) access; uploads require write credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Anonymous,
    Authenticated,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write credentials for authenticated sessions.
#[derive(Clone, Default)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Everything needed to build a store from configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreSettings {
    /// Store type, e.g. `azure-blob-storage` or `local`
    pub kind: String,
    /// Storage account (Azure) or root directory (local)
    pub account: String,
    pub credentials: Credentials,
    /// Overall timeout for a single transfer (None = no limit)
    pub transfer_timeout: Option<Duration>,
}

/// A remote blob store that can open sessions.
pub trait BlobStore {
    /// Open a session with the given access mode.
    fn connect(&self, access: AccessMode) -> StoreResult<Box<dyn BlobClient>>;
}

/// An open blob store session.
pub trait BlobClient {
    /// Download `container/blob` to `dest`. `dest` is only replaced once the
    /// whole blob has been received.
    fn download(&self, container: &str, blob: &str, dest: &Path) -> StoreResult<()>;

    /// Upload the file at `source` to `container/blob`, replacing any
    /// existing blob.
    fn upload(&self, source: &Path, container: &str, blob: &str) -> StoreResult<()>;
}

/// Store used when the configured type is not recognized.
#[derive(Debug, Clone)]
pub struct UnsupportedStore {
    kind: String,
}

impl UnsupportedStore {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl BlobStore for UnsupportedStore {
    fn connect(&self, _access: AccessMode) -> StoreResult<Box<dyn BlobClient>> {
        Err(StoreError::UnsupportedStoreType(self.kind.clone()))
    }
}

/// Build a store for the configured type.
///
/// Never fails: an unknown or empty type yields a store whose sessions fail,
/// so misconfiguration only surfaces when a transfer is attempted.
pub fn store_for_settings(settings: StoreSettings) -> Box<dyn BlobStore> {
    match settings.kind.to_ascii_lowercase().as_str() {
        AZURE_STORE_TYPE | "azure" => Box::new(AzureBlobStore::new(
            settings.account,
            settings.credentials,
            settings.transfer_timeout,
        )),
        LOCAL_STORE_TYPE | "filesystem" => Box::new(LocalBlobStore::new(settings.account)),
        _ => Box::new(UnsupportedStore::new(settings.kind)),
    }
}

/// Write `dest` atomically: the writer fills a temp file in the same
/// directory, which is renamed over `dest` on success.
pub(crate) fn atomic_write_with<F>(dest: &Path, write: F) -> StoreResult<u64>
where
    F: FnOnce(&mut std::fs::File) -> StoreResult<u64>,
{
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io_err = |source: io::Error| StoreError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    let written = write(tmp.as_file_mut())?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(dest).map_err(|e| io_err(e.error))?;
    Ok(written)
}
