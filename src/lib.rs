//! ccache group synchronization
//!
//! Build farms compile many related packages on short-lived workers. Packages
//! that share sources are placed in named cache groups, and each group's
//! ccache directory is shared through a remote blob store: downloaded before
//! a package builds, uploaded after it (or once, in a sweep, at the end of
//! the build).
//!
//! Local layout for a cache root `<root>`:
//!
//! ```text
//! <root>/<arch>/<group>/             ccache directory
//! <root>-downloads/<group>-...       downloaded archives and tags
//! <root>-uploads/<group>-...         archives and tags being published
//! <root>-locks/<arch>/<group>.lock   per-group transfer lock
//! ```
//!
//! Remote layout inside the configured container:
//!
//! ```text
//! <arch>/<folder>/<group>-ccache.tar.gz
//! <arch>/<tags-folder>/<group>-latest-build.txt
//! ```

pub mod archive;
pub mod cancel;
pub mod config;
pub mod error;
pub mod group;
pub mod lock;
pub mod mock;
pub mod paths;
pub mod sweep;
pub mod sync;

pub use archive::{ArchiveError, Archiver, TarGzArchiver};
pub use cancel::{CancelFlag, EXIT_CODE_CANCELLED};
pub use config::{CCacheConfig, CacheGroup, ConfigError, ConfigWarning, RemoteStoreConfig};
pub use error::{SyncError, SyncResult};
pub use group::{GroupIdentity, COMMON_GROUP};
pub use paths::{plan_cache_dir, ArchivePaths, CacheLayout, RemoteFolders, TransferPaths};
pub use sweep::{SweepReport, SweepStatus, SweepTarget};
pub use sync::{CCacheManager, DownloadOutcome, SyncOptions, UploadOutcome};
