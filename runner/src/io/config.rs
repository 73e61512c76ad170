//! Runner configuration stored under `.missions/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::explore::ExplorePolicy;
use crate::core::quota::PausePolicy;
use crate::core::schedule::{HourRange, parse_ranges_lenient};
use crate::io::atomic::write_atomic;

/// Runner configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values in [`RunnerConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// IANA zone for wall-clock decisions (reset texts, daily due-ness, windows).
    pub timezone: String,

    /// Sleep between iterations while paused.
    pub poll_interval_secs: u64,

    /// Sleep between iterations when there is nothing to do.
    pub idle_interval_secs: u64,

    /// Sleep after a retryable store error before the next iteration.
    pub retry_backoff_secs: u64,

    /// Runs allowed between resumes before a cooldown pause. `0` disables the ceiling.
    pub max_runs_per_session: u32,

    /// Length of manual, run-ceiling and other non-quota pauses.
    pub cooldown_hours: u32,

    /// Pause length when a quota reset time cannot be parsed.
    pub quota_fallback_minutes: u32,

    /// Wall-clock budget for a single task.
    pub task_timeout_secs: u64,

    /// Truncate captured task output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub agent: AgentConfig,
    pub notify: NotifyConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command that executes one mission; the mission text is written to its stdin.
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// Command receiving each notification as its last argument. Empty logs only.
    pub command: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Deep-work hours, e.g. `"9-12,14-17"`.
    pub deep_hours: String,
    /// Focused-work hours, e.g. `"8-19"`.
    pub work_hours: String,
    pub explore_chance: f64,
    pub work_explore_chance: f64,
    pub explore_prompt: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            deep_hours: String::new(),
            work_hours: String::new(),
            explore_chance: 0.1,
            work_explore_chance: 0.02,
            explore_prompt: None,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            poll_interval_secs: 60,
            idle_interval_secs: 300,
            retry_backoff_secs: 5,
            max_runs_per_session: 0,
            cooldown_hours: 5,
            quota_fallback_minutes: 60,
            task_timeout_secs: 60 * 60,
            output_limit_bytes: 200_000,
            agent: AgentConfig::default(),
            notify: NotifyConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_timeout_secs == 0 {
            return Err(anyhow!("task_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        for (name, chance) in [
            ("schedule.explore_chance", self.schedule.explore_chance),
            (
                "schedule.work_explore_chance",
                self.schedule.work_explore_chance,
            ),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(anyhow!("{name} must be within 0.0..=1.0"));
            }
        }
        Ok(())
    }

    /// Configured zone; an unknown name falls back to UTC with a warning.
    pub fn zone(&self) -> Tz {
        match self.timezone.trim().parse::<Tz>() {
            Ok(zone) => zone,
            Err(_) => {
                warn!(timezone = %self.timezone, "unknown timezone, using UTC");
                Tz::UTC
            }
        }
    }

    pub fn pause_policy(&self, zone: Tz) -> PausePolicy {
        PausePolicy {
            cooldown: Duration::hours(i64::from(self.cooldown_hours)),
            quota_fallback: Duration::minutes(i64::from(self.quota_fallback_minutes)),
            zone,
        }
    }

    pub fn explore_policy(&self) -> ExplorePolicy {
        ExplorePolicy {
            explore_prompt: self.schedule.explore_prompt.clone(),
            explore_chance: self.schedule.explore_chance,
            work_explore_chance: self.schedule.work_explore_chance,
        }
    }

    /// Parsed `(deep, work)` windows. Malformed strings degrade to no ranges.
    pub fn windows(&self) -> (Vec<HourRange>, Vec<HourRange>) {
        (
            parse_ranges_lenient(&self.schedule.deep_hours),
            parse_ranges_lenient(&self.schedule.work_hours),
        )
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
        .with_context(|| format!("replace config {}", path.display()))
}
