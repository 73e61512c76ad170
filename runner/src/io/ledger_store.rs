//! Locked read-transform-write access to `MISSIONS.md`.
//!
//! [`LedgerStore::modify`] is the only way the runner changes the ledger. It
//! holds an exclusive lock on the sidecar `MISSIONS.md.lock` across the whole
//! cycle, so an operator tool appending a mission while the loop is
//! mid-iteration is serialized with it rather than interleaved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::ledger::MissionLedger;
use crate::io::atomic::{LOCK_RETRIES, lock_exclusive_with_retry, sibling, write_atomic};

/// Ledger storage failures, classified for the run loop.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer held the lock for the whole retry window.
    #[error("ledger lock busy: {}", path.display())]
    LockBusy { path: PathBuf },

    /// Transient I/O failure (disk full, interrupted write).
    #[error("ledger I/O failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The ledger path itself is unusable; continuing risks data loss.
    #[error("ledger unusable at {}: {reason}", path.display())]
    Fatal { path: PathBuf, reason: String },
}

impl StoreError {
    /// Whether the loop should back off and try again next iteration.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockBusy { .. } | StoreError::Io { .. })
    }

    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::WouldBlock => StoreError::LockBusy {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidData => StoreError::Fatal {
                path: path.to_path_buf(),
                reason: source.to_string(),
            },
            _ => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Handle on the ledger file and its sidecar lock.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_retries: u32,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: sibling(&path, "lock"),
            path,
            lock_retries: LOCK_RETRIES,
        }
    }

    /// Override how many lock attempts are made before reporting [`StoreError::LockBusy`].
    pub fn with_lock_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the ledger without locking. A missing file is an empty ledger.
    ///
    /// Writers replace the file by rename, so an unlocked reader always sees a whole document.
    pub fn load(&self) -> Result<MissionLedger, StoreError> {
        Ok(MissionLedger::parse(&self.read_document()?))
    }

    /// Lock, read, apply `transform`, write back if anything changed, unlock.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn modify<T>(
        &self,
        transform: impl FnOnce(&mut MissionLedger) -> T,
    ) -> Result<T, StoreError> {
        let _guard = lock_exclusive_with_retry(&self.lock_path, self.lock_retries)
            .map_err(|err| StoreError::from_io(&self.lock_path, err))?;

        let before = self.read_document()?;
        let mut ledger = MissionLedger::parse(&before);
        let result = transform(&mut ledger);
        let after = ledger.render();

        if after == before {
            debug!("ledger unchanged, skipping write");
        } else {
            write_atomic(&self.path, after.as_bytes())
                .map_err(|err| StoreError::from_io(&self.path, err))?;
            debug!(bytes = after.len(), "ledger written");
        }
        Ok(result)
    }

    fn read_document(&self) -> Result<String, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) if !meta.is_file() => {
                return Err(StoreError::Fatal {
                    path: self.path.clone(),
                    reason: "not a regular file".to_string(),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
            _ => {}
        }
        fs::read_to_string(&self.path).map_err(|err| StoreError::from_io(&self.path, err))
    }
}
