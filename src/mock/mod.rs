//! Test doubles for the sync engine
//!
//! Both doubles are cheap to clone and share their state, so a test can hand
//! one clone to `CCacheManager` and inspect the other afterwards.
//!
//! - `RecordingBlobStore`: in-memory blobs keyed by `container/blob`, every
//!   session and transfer recorded, with failure injection per access mode
//!   or blob name
//! - `RecordingArchiver`: records compress/extract calls without touching
//!   archive formats

mod archiver;
mod store;

pub use archiver::{ArchiveCall, RecordingArchiver, PLACEHOLDER_ARCHIVE};
pub use store::{RecordingBlobStore, StoreCall};
