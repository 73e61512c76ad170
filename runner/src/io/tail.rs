//! Background tail of a running task's stream file into `.missions/live.log`.
//!
//! The tail runs on its own thread, polls at a fixed interval, and stops when
//! told to over a channel. Finishing waits a bounded time for the thread; a
//! tail that fails or hangs is logged and never affects the task outcome.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::io::atomic::{LOCK_RETRIES, lock_exclusive_with_retry, sibling};

/// Handle on a running tail thread.
#[derive(Debug)]
pub struct LiveTail {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl LiveTail {
    /// Start copying new bytes of `source` to the end of `dest` every `interval`.
    ///
    /// `dest` is truncated to `header` first, so it only ever holds the current
    /// task. Full transcripts live in the session directories.
    pub fn spawn(source: PathBuf, dest: PathBuf, header: &str, interval: Duration) -> Self {
        if let Err(err) = truncate_locked(&dest, header.as_bytes()) {
            warn!(path = %dest.display(), err = %err, "live tail header failed");
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("live-tail".to_string())
            .spawn(move || {
                run(&source, &dest, interval, &stop_rx);
                let _ = done_tx.send(());
            });
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(err = %err, "live tail thread did not start");
                None
            }
        };
        Self {
            stop_tx,
            done_rx,
            handle,
        }
    }

    /// Stop the tail and wait up to `timeout` for its final copy. Returns false if it did not finish.
    pub fn finish(mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        let _ = self.stop_tx.send(());
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => {
                if handle.join().is_err() {
                    warn!("live tail thread panicked");
                    return false;
                }
                true
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "live tail did not stop in time, detaching"
                );
                false
            }
        }
    }
}

fn run(source: &Path, dest: &Path, interval: Duration, stop_rx: &Receiver<()>) {
    let mut offset = 0u64;
    let mut failing = false;
    loop {
        let stopping = match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        match copy_new_bytes(source, dest, &mut offset) {
            Ok(copied) if copied > 0 => {
                debug!(copied, offset, "live tail copied");
                failing = false;
            }
            Ok(_) => {}
            Err(err) => {
                if !failing {
                    warn!(source = %source.display(), err = %err, "live tail copy failed");
                }
                failing = true;
            }
        }
        if stopping {
            break;
        }
    }
}

fn copy_new_bytes(source: &Path, dest: &Path, offset: &mut u64) -> io::Result<usize> {
    let mut file = match File::open(source) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let len = file.metadata()?.len();
    if len < *offset {
        // Source was truncated or replaced; start over.
        *offset = 0;
    }
    file.seek(SeekFrom::Start(*offset))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Ok(0);
    }
    append_locked(dest, &buf)?;
    *offset += buf.len() as u64;
    Ok(buf.len())
}

/// Append under the same sidecar-lock discipline as other shared files.
pub fn append_locked(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let _guard = lock_exclusive_with_retry(&sibling(path, "lock"), LOCK_RETRIES)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()
}

/// Replace the contents of `path` with `bytes` under its sidecar lock.
pub fn truncate_locked(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let _guard = lock_exclusive_with_retry(&sibling(path, "lock"), LOCK_RETRIES)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()
}
