//! Process-wide marker files: stop, focus, heartbeat.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::io::atomic::{remove_if_exists, write_atomic};
use crate::io::init::MissionPaths;

#[derive(Debug, Clone)]
pub struct Signals {
    stop_path: PathBuf,
    focus_path: PathBuf,
    heartbeat_path: PathBuf,
}

impl Signals {
    pub fn new(paths: &MissionPaths) -> Self {
        Self {
            stop_path: paths.stop_path.clone(),
            focus_path: paths.focus_path.clone(),
            heartbeat_path: paths.heartbeat_path.clone(),
        }
    }

    /// Whether a stop after the current task has been requested.
    pub fn stop_requested(&self) -> bool {
        self.stop_path.exists()
    }

    pub fn request_stop(&self) -> Result<()> {
        write_atomic(&self.stop_path, b"")
            .with_context(|| format!("write {}", self.stop_path.display()))
    }

    pub fn clear_stop(&self) -> Result<()> {
        remove_if_exists(&self.stop_path)
            .with_context(|| format!("remove {}", self.stop_path.display()))
    }

    /// Project filter for picking missions, if focus is set.
    pub fn focus(&self) -> Result<Option<String>> {
        let Some(contents) = read_optional(&self.focus_path)? else {
            return Ok(None);
        };
        let project = contents.trim();
        Ok((!project.is_empty()).then(|| project.to_string()))
    }

    /// Set or clear (`None`) the focus project.
    pub fn set_focus(&self, project: Option<&str>) -> Result<()> {
        match project.map(str::trim).filter(|p| !p.is_empty()) {
            Some(project) => {
                debug!(project, "focus set");
                write_atomic(&self.focus_path, format!("{project}\n").as_bytes())
                    .with_context(|| format!("write {}", self.focus_path.display()))
            }
            None => remove_if_exists(&self.focus_path)
                .with_context(|| format!("remove {}", self.focus_path.display())),
        }
    }

    /// Record that the loop is alive at `now`.
    pub fn beat(&self, now: DateTime<Utc>) -> Result<()> {
        write_atomic(
            &self.heartbeat_path,
            format!("{}\n", now.timestamp()).as_bytes(),
        )
        .with_context(|| format!("write {}", self.heartbeat_path.display()))
    }

    /// Last heartbeat, or `None` if missing or unreadable.
    pub fn last_heartbeat(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(contents) = read_optional(&self.heartbeat_path)? else {
            return Ok(None);
        };
        match contents.trim().parse::<i64>() {
            Ok(epoch) => Ok(DateTime::<Utc>::from_timestamp(epoch, 0)),
            Err(_) => {
                warn!(path = %self.heartbeat_path.display(), "unreadable heartbeat");
                Ok(None)
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signals() -> (tempfile::TempDir, Signals) {
        let temp = tempfile::tempdir().expect("tempdir");
        let signals = Signals::new(&MissionPaths::new(temp.path()));
        (temp, signals)
    }

    #[test]
    fn stop_flag_round_trip() {
        let (_temp, signals) = signals();
        assert!(!signals.stop_requested());
        signals.request_stop().expect("stop");
        assert!(signals.stop_requested());
        signals.clear_stop().expect("clear");
        assert!(!signals.stop_requested());
    }

    #[test]
    fn focus_set_and_clear() {
        let (_temp, signals) = signals();
        assert_eq!(signals.focus().expect("focus"), None);
        signals.set_focus(Some(" web ")).expect("set");
        assert_eq!(signals.focus().expect("focus").as_deref(), Some("web"));
        signals.set_focus(None).expect("clear");
        assert_eq!(signals.focus().expect("focus"), None);
    }

    #[test]
    fn heartbeat_records_epoch() {
        let (_temp, signals) = signals();
        let now = Utc.with_ymd_and_hms(2026, 2, 4, 9, 0, 0).single().expect("time");
        assert_eq!(signals.last_heartbeat().expect("read"), None);
        signals.beat(now).expect("beat");
        assert_eq!(signals.last_heartbeat().expect("read"), Some(now));
    }
}
