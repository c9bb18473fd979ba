//! Per-group advisory locking
//!
//! Builds that run in parallel must not download into or upload from the same
//! `{arch, group}` cache directory at the same time. Every sync call holds a
//! `GroupLock` on `<root>-locks/<arch>/<group>.lock` for its whole duration.
//!
//! The lock file lives outside the cache directory so it never ends up inside
//! an uploaded archive.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

/// Default time to wait for a contended group lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for {path}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct GroupLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl GroupLock {
    /// Acquire the lock at `path`, waiting up to `timeout`.
    ///
    /// Creates the parent directory and lock file as needed.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let io_err = |source: io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let start = Instant::now();
        let poll_interval = Duration::from_millis(100);
        let mut warned = false;

        loop {
            match Self::try_acquire_exclusive(path) {
                Ok(file) => {
                    if warned {
                        info!(
                            path = %path.display(),
                            waited_secs = start.elapsed().as_secs_f64(),
                            "acquired ccache group lock after contention"
                        );
                    }
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > Duration::from_millis(500) {
                        warn!(path = %path.display(), "ccache group lock is held, waiting");
                        warned = true;
                    }
                }
                Err(e) => return Err(io_err(e)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }

            std::thread::sleep(poll_interval);
        }
    }

    #[cfg(unix)]
    fn try_acquire_exclusive(path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(path)?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_acquire_exclusive(path: &Path) -> io::Result<File> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GroupLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache-locks/x86_64/g1.lock");

        let lock = GroupLock::acquire(&path, Duration::from_secs(1)).unwrap();
        assert!(lock.path().exists());
        assert_eq!(lock.path(), path);
    }

    #[test]
    fn test_reacquire_after_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("g1.lock");

        {
            let _lock = GroupLock::acquire(&path, Duration::from_secs(1)).unwrap();
        }
        let lock = GroupLock::acquire(&path, Duration::from_secs(1));
        assert!(lock.is_ok());
    }

    #[test]
    fn test_contended_lock_times_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("g1.lock");

        let _held = GroupLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let start = Instant::now();
        let result = GroupLock::acquire(&path, Duration::from_millis(200));
        assert!(matches!(result, Err(LockError::Timeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_different_groups_do_not_contend() {
        let temp = TempDir::new().unwrap();
        let _g1 = GroupLock::acquire(&temp.path().join("g1.lock"), Duration::from_secs(1)).unwrap();
        let g2 = GroupLock::acquire(&temp.path().join("g2.lock"), Duration::from_millis(200));
        assert!(g2.is_ok());
    }
}
