//! Exclusive session on a database root
//!
//! A session is acquired once when a database is opened and released once
//! when it is closed. Acquisition creates `.shelf/session.lock`; release
//! removes it. Release also runs on drop, so an early return or a failed
//! operation never leaves the lock behind.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

const LOCK_FILE: &str = "session.lock";

#[derive(Debug)]
struct SessionState {
    lock_path: PathBuf,
    active: AtomicBool,
}

/// Owner of the session lock
#[derive(Debug)]
pub struct Session {
    state: Arc<SessionState>,
}

/// Cheap handle stores use to check the session is still open
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<SessionState>,
}

impl Session {
    /// Acquire the session for a database whose metadata lives in `meta_dir`
    pub fn acquire(meta_dir: &Path) -> Result<Self> {
        let lock_path = meta_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::unavailable(format!(
                    "database is locked by another session ({})",
                    lock_path.display()
                )),
                _ => Error::unavailable(format!("cannot create {}: {}", lock_path.display(), e)),
            })?;

        writeln!(file, "{}", std::process::id()).map_err(|source| Error::FileWriteError {
            path: lock_path.clone(),
            source,
        })?;

        tracing::debug!("Acquired session lock {}", lock_path.display());

        Ok(Self {
            state: Arc::new(SessionState {
                lock_path,
                active: AtomicBool::new(true),
            }),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Release the lock. Calling this more than once is a no-op.
    pub fn release(&self) -> Result<()> {
        if !self.state.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        match std::fs::remove_file(&self.state.lock_path) {
            Ok(()) => {
                tracing::debug!("Released session lock {}", self.state.lock_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::FileWriteError {
                path: self.state.lock_path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to release session lock: {}", e);
        }
    }
}

impl SessionHandle {
    /// Fails with `StoreUnavailable` once the session has been released
    pub fn check(&self) -> Result<()> {
        if self.state.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable("session has been closed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_session_is_refused() {
        let tmp = TempDir::new().unwrap();
        let first = Session::acquire(tmp.path()).unwrap();

        let second = Session::acquire(tmp.path());
        assert!(matches!(second, Err(Error::StoreUnavailable { .. })));

        drop(first);
        assert!(!tmp.path().join(LOCK_FILE).exists());
        assert!(Session::acquire(tmp.path()).is_ok());
    }

    #[test]
    fn test_release_invalidates_handles() {
        let tmp = TempDir::new().unwrap();
        let session = Session::acquire(tmp.path()).unwrap();
        let handle = session.handle();
        assert!(handle.check().is_ok());

        session.release().unwrap();
        session.release().unwrap();
        assert!(matches!(handle.check(), Err(Error::StoreUnavailable { .. })));
    }
}
