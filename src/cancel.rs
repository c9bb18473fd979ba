//! Cooperative cancellation
//!
//! Transfers and archive operations block until they finish. A `CancelFlag`
//! is checked between steps so an interrupted build stops at the next step
//! boundary instead of starting another multi-gigabyte transfer.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Exit code used when the process stops because of an interrupt
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` if cancellation was requested.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Install a Ctrl-C / SIGTERM handler that sets this flag.
    ///
    /// The first signal requests cancellation; a second one exits immediately.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        let count = Arc::new(AtomicU8::new(0));
        ctrlc::set_handler(move || {
            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                warn!("interrupt received; stopping after the current step");
                flag.cancel();
            } else {
                std::process::exit(EXIT_CODE_CANCELLED);
            }
        })
    }
}
