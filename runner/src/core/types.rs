//! Shared deterministic types for runner core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the runner is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// The external resource provider reported an exhausted budget.
    Quota,
    /// The per-session run ceiling was reached.
    MaxRuns,
    /// An operator paused the runner.
    Manual,
    Other,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::Quota => "quota",
            PauseReason::MaxRuns => "max_runs",
            PauseReason::Manual => "manual",
            PauseReason::Other => "other",
        }
    }

    /// Parse a persisted reason. Unknown values map to [`PauseReason::Other`].
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(PauseReason::Other)
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PauseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "quota" => Ok(PauseReason::Quota),
            "max_runs" => Ok(PauseReason::MaxRuns),
            "manual" => Ok(PauseReason::Manual),
            "other" => Ok(PauseReason::Other),
            other => Err(format!("unknown pause reason '{other}'")),
        }
    }
}

/// A persisted pause: why, until when, and what to show a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    pub reason: PauseReason,
    pub resume_at: DateTime<Utc>,
    pub display: String,
}

/// Recurrence frequency for recurring missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(format!("unknown frequency '{other}' (hourly|daily|weekly)")),
        }
    }
}

/// Time-of-day working mode derived from the schedule windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Deep,
    Work,
    Normal,
}

impl ScheduleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleMode::Deep => "deep",
            ScheduleMode::Work => "work",
            ScheduleMode::Normal => "normal",
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one task attempt as recorded in run state and session logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed,
    TimedOut,
    QuotaExhausted,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failed => "failed",
            TaskOutcome::TimedOut => "timed_out",
            TaskOutcome::QuotaExhausted => "quota_exhausted",
        }
    }

    /// Whether the mission goes back to Pending instead of Done.
    pub fn requeues(self) -> bool {
        !matches!(self, TaskOutcome::Success)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
