//! Run bookkeeping (`.missions/state/run_state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::TaskOutcome;
use crate::io::atomic::write_atomic;

/// Persisted bookkeeping across loop iterations and process restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunState {
    /// Task attempts since the last resume (or since the counter was reset).
    pub runs_since_resume: u32,
    /// Task attempts ever recorded.
    pub total_runs: u64,
    /// Session id of the most recent attempt.
    pub last_session: Option<String>,
    /// Mission text of the most recent attempt.
    pub last_mission: Option<String>,
    pub last_outcome: Option<TaskOutcome>,
    pub last_duration_ms: Option<u64>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Record one finished attempt.
    pub fn record_run(
        &mut self,
        session_id: &str,
        mission: &str,
        outcome: TaskOutcome,
        duration_ms: u64,
        finished_at: DateTime<Utc>,
    ) {
        self.runs_since_resume = self.runs_since_resume.saturating_add(1);
        self.total_runs = self.total_runs.saturating_add(1);
        self.last_session = Some(session_id.to_string());
        self.last_mission = Some(mission.to_string());
        self.last_outcome = Some(outcome);
        self.last_duration_ms = Some(duration_ms);
        self.last_finished_at = Some(finished_at);
    }
}

/// Load run state from disk. A missing file is the default state.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    debug!(path = %path.display(), "loading run state");
    if !path.exists() {
        return Ok(RunState::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    debug!(
        runs_since_resume = state.runs_since_resume,
        total_runs = state.total_runs,
        "run state loaded"
    );
    Ok(state)
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(path = %path.display(), runs_since_resume = state.runs_since_resume, "writing run state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
        .with_context(|| format!("replace run state {}", path.display()))
}
