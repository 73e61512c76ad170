//! Per-attempt session logs under `.missions/sessions/<session-id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::types::{ScheduleMode, TaskOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    pub session_id: String,
    pub mission: String,
    pub project: Option<String>,
    /// True when the explore prompt ran instead of a queued mission.
    pub explore: bool,
    pub mode: ScheduleMode,
    pub outcome: TaskOutcome,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub output_path: PathBuf,
    pub stream_path: PathBuf,
}

impl SessionPaths {
    pub fn new(sessions_dir: &Path, session_id: &str) -> Self {
        let dir = sessions_dir.join(session_id);
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            output_path: dir.join("output.log"),
            stream_path: dir.join("stream.log"),
        }
    }
}

/// Sortable, collision-resistant session id: `20260204T090000Z-3fa2`.
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..=u16::MAX);
    format!("{}-{suffix:04x}", now.format("%Y%m%dT%H%M%SZ"))
}

pub fn write_session(paths: &SessionPaths, meta: &SessionMeta, output: &str) -> Result<()> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create session dir {}", paths.dir.display()))?;
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    fs::write(&paths.meta_path, buf)
        .with_context(|| format!("write {}", paths.meta_path.display()))?;
    fs::write(&paths.output_path, output)
        .with_context(|| format!("write {}", paths.output_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(&temp.path().join("sessions"), "s-1");
        assert!(paths.dir.ends_with("sessions/s-1"));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.output_path.ends_with("output.log"));
        assert!(paths.stream_path.ends_with("stream.log"));
    }

    #[test]
    fn session_id_sorts_by_time() {
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 9, 0, 0).single().expect("time");
        let id = new_session_id(at);
        assert!(id.starts_with("20260204T090000Z-"));
        assert_eq!(id.len(), "20260204T090000Z-".len() + 4);
    }

    #[test]
    fn writes_meta_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path(), "s-9");
        let at = Utc.with_ymd_and_hms(2026, 2, 4, 9, 0, 0).single().expect("time");
        let meta = SessionMeta {
            session_id: "s-9".to_string(),
            mission: "fix bug".to_string(),
            project: None,
            explore: false,
            mode: ScheduleMode::Normal,
            outcome: TaskOutcome::Success,
            exit_code: Some(0),
            started_at: at,
            ended_at: at,
            duration_ms: 0,
        };
        write_session(&paths, &meta, "done\n").expect("write");

        let loaded: SessionMeta =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("read"))
                .expect("parse");
        assert_eq!(loaded, meta);
        assert_eq!(fs::read_to_string(&paths.output_path).expect("read"), "done\n");
    }
}
