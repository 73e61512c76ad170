//! Temp-file + rename writes and sidecar advisory locks.
//!
//! Every piece of shared state under `.missions/` is replaced whole: readers see
//! either the old file or the new one, never a half-written one. Writers that
//! read-modify-write additionally hold an exclusive `fs2` lock on a sibling
//! `<name>.lock` file for the whole cycle.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Attempts before a contended lock is reported as busy.
pub const LOCK_RETRIES: u32 = 50;
/// Delay between lock attempts.
pub const LOCK_RETRY_MS: u64 = 100;

/// Write `contents` to `path` via a sibling temp file, fsync, then rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sibling(path, "tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// Remove `path`, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// `<path>.<suffix>`, e.g. `MISSIONS.md.lock`.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), err = %err, "failed to release lock");
        }
    }
}

/// Take an exclusive lock on `lock_path`, retrying while another holder has it.
///
/// Gives up with `ErrorKind::WouldBlock` after `retries` attempts.
pub fn lock_exclusive_with_retry(lock_path: &Path, retries: u32) -> io::Result<LockGuard> {
    if let Some(parent) = lock_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;
    for attempt in 0..retries.max(1) {
        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!(path = %lock_path.display(), attempt, "lock acquired");
                return Ok(LockGuard {
                    file,
                    path: lock_path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
            }
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::WouldBlock,
        format!("lock timeout on {}", lock_path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("state.txt");
        write_atomic(&path, b"one").expect("first write");
        write_atomic(&path, b"two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn second_lock_holder_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let lock_path = temp.path().join("MISSIONS.md.lock");
        let held = lock_exclusive_with_retry(&lock_path, 1).expect("first lock");
        let err = lock_exclusive_with_retry(&lock_path, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        drop(held);
        lock_exclusive_with_retry(&lock_path, 1).expect("lock after release");
    }

    #[test]
    fn remove_if_exists_ignores_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        remove_if_exists(&temp.path().join("nope")).expect("missing is fine");
    }
}
