//! Pause presence flag and 3-line reason record under `.missions/state/`.
//!
//! Record format:
//!
//! ```text
//! quota
//! 1770195600
//! Wed Feb 4 10:00 (Europe/Paris)
//! ```

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::core::quota::{PauseRecord, PauseSnapshot};
use crate::core::types::{PauseReason, PauseState};
use crate::io::atomic::{
    LOCK_RETRIES, LockGuard, lock_exclusive_with_retry, remove_if_exists, write_atomic,
};
use crate::io::init::MissionPaths;

/// What [`PauseStore::modify`] does to the files after deciding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseEdit {
    Keep,
    Write(PauseState),
    Clear,
}

#[derive(Debug, Clone)]
pub struct PauseStore {
    flag_path: PathBuf,
    reason_path: PathBuf,
    lock_path: PathBuf,
}

impl PauseStore {
    pub fn new(paths: &MissionPaths) -> Self {
        Self {
            flag_path: paths.paused_path.clone(),
            reason_path: paths.pause_reason_path.clone(),
            lock_path: paths.pause_lock_path.clone(),
        }
    }

    /// Read both files as they are right now, without the lock.
    ///
    /// A writer may be between the record and the flag; only use this for
    /// read-only reporting. Decisions that edit the files go through [`Self::modify`].
    pub fn snapshot(&self) -> Result<PauseSnapshot> {
        let flag_present = self.flag_path.exists();
        let record = match fs::read_to_string(&self.reason_path) {
            Ok(contents) => parse_record(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => PauseRecord::Missing,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                PauseRecord::Corrupt("not valid UTF-8".to_string())
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read {}", self.reason_path.display()));
            }
        };
        Ok(PauseSnapshot {
            flag_present,
            record,
        })
    }

    /// Read, decide and edit under one hold of the pause lock.
    pub fn modify<T>(&self, decide: impl FnOnce(&PauseSnapshot) -> (PauseEdit, T)) -> Result<T> {
        let _guard = self.lock()?;
        let snapshot = self.snapshot()?;
        let (edit, value) = decide(&snapshot);
        match edit {
            PauseEdit::Keep => {}
            PauseEdit::Write(state) => self.write_unlocked(&state)?,
            PauseEdit::Clear => self.clear_unlocked()?,
        }
        Ok(value)
    }

    /// Persist a pause: reason record first, then the presence flag.
    #[instrument(skip_all, fields(reason = %state.reason, resume_at = %state.resume_at))]
    pub fn write(&self, state: &PauseState) -> Result<()> {
        self.modify(|_| (PauseEdit::Write(state.clone()), ()))
    }

    /// Remove the pause: presence flag first, then the reason record.
    pub fn clear(&self) -> Result<()> {
        self.modify(|_| (PauseEdit::Clear, ()))
    }

    fn write_unlocked(&self, state: &PauseState) -> Result<()> {
        write_atomic(&self.reason_path, render_record(state).as_bytes())
            .with_context(|| format!("write {}", self.reason_path.display()))?;
        write_atomic(&self.flag_path, b"")
            .with_context(|| format!("write {}", self.flag_path.display()))?;
        debug!("pause written");
        Ok(())
    }

    fn clear_unlocked(&self) -> Result<()> {
        remove_if_exists(&self.flag_path)
            .with_context(|| format!("remove {}", self.flag_path.display()))?;
        remove_if_exists(&self.reason_path)
            .with_context(|| format!("remove {}", self.reason_path.display()))?;
        debug!("pause cleared");
        Ok(())
    }

    fn lock(&self) -> Result<LockGuard> {
        lock_exclusive_with_retry(&self.lock_path, LOCK_RETRIES)
            .with_context(|| format!("lock {}", self.lock_path.display()))
    }
}

/// Serialize a pause into the 3-line record. The display string is kept on one line.
pub fn render_record(state: &PauseState) -> String {
    let display = state.display.replace(['\r', '\n'], " ");
    format!(
        "{}\n{}\n{}\n",
        state.reason,
        state.resume_at.timestamp(),
        display.trim()
    )
}

/// Parse the 3-line record. Anything else is [`PauseRecord::Corrupt`].
pub fn parse_record(contents: &str) -> PauseRecord {
    let lines: Vec<&str> = contents.lines().collect();
    if lines.len() < 2 || lines.len() > 3 {
        return PauseRecord::Corrupt(format!("expected 3 lines, found {}", lines.len()));
    }
    let Ok(epoch) = lines[1].trim().parse::<i64>() else {
        return PauseRecord::Corrupt(format!("bad resume epoch '{}'", lines[1].trim()));
    };
    let Some(resume_at) = DateTime::<Utc>::from_timestamp(epoch, 0) else {
        return PauseRecord::Corrupt(format!("resume epoch {epoch} out of range"));
    };
    PauseRecord::Valid(PauseState {
        reason: PauseReason::parse_lenient(lines[0]),
        resume_at,
        display: lines.get(2).map(|d| d.trim().to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, MissionPaths, PauseStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = MissionPaths::new(temp.path());
        let store = PauseStore::new(&paths);
        (temp, paths, store)
    }

    fn sample() -> PauseState {
        PauseState {
            reason: PauseReason::Quota,
            resume_at: Utc.with_ymd_and_hms(2026, 2, 4, 9, 0, 0).single().expect("time"),
            display: "Wed Feb 4 10:00\n(Europe/Paris)".to_string(),
        }
    }

    #[test]
    fn write_then_snapshot_reads_back() {
        let (_temp, paths, store) = store();
        store.write(&sample()).expect("write");

        assert_eq!(
            fs::read_to_string(&paths.pause_reason_path).expect("read"),
            "quota\n1770195600\nWed Feb 4 10:00 (Europe/Paris)\n"
        );
        assert_eq!(fs::metadata(&paths.paused_path).expect("flag").len(), 0);

        let snapshot = store.snapshot().expect("snapshot");
        assert!(snapshot.flag_present);
        match snapshot.record {
            PauseRecord::Valid(state) => {
                assert_eq!(state.resume_at, sample().resume_at);
                assert_eq!(state.display, "Wed Feb 4 10:00 (Europe/Paris)");
            }
            other => panic!("expected valid record, got {other:?}"),
        }
    }

    #[test]
    fn clear_removes_both_files() {
        let (_temp, paths, store) = store();
        store.write(&sample()).expect("write");
        store.clear().expect("clear");
        store.clear().expect("clear twice");
        assert!(!paths.paused_path.exists());
        assert!(!paths.pause_reason_path.exists());
        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(
            snapshot,
            PauseSnapshot {
                flag_present: false,
                record: PauseRecord::Missing
            }
        );
    }

    #[test]
    fn modify_decides_on_locked_snapshot() {
        let (_temp, paths, store) = store();
        store.write(&sample()).expect("write");

        let seen = store
            .modify(|snapshot| (PauseEdit::Keep, snapshot.flag_present))
            .expect("keep");
        assert!(seen);
        assert!(paths.paused_path.exists());

        let was_valid = store
            .modify(|snapshot| {
                let valid = matches!(snapshot.record, PauseRecord::Valid(_));
                (PauseEdit::Clear, valid)
            })
            .expect("clear");
        assert!(was_valid);
        assert!(!paths.pause_reason_path.exists());
    }

    #[test]
    fn parse_record_flags_corruption() {
        assert!(matches!(parse_record(""), PauseRecord::Corrupt(_)));
        assert!(matches!(
            parse_record("quota\nsoon\nlater\n"),
            PauseRecord::Corrupt(_)
        ));
        assert!(matches!(
            parse_record("quota\n1\n2\n3\n"),
            PauseRecord::Corrupt(_)
        ));
        assert!(matches!(
            parse_record("max-runs\n1770195600\n"),
            PauseRecord::Valid(PauseState {
                reason: PauseReason::MaxRuns,
                ..
            })
        ));
    }
}
