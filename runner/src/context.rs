//! Passed-down context for one runner process.
//!
//! Holds the resolved paths, the current config snapshot and handles on every
//! store. There is no process-wide state; long-running callers pick up config
//! edits with an explicit [`MissionContext::refresh`].

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::core::quota::PausePolicy;
use crate::core::schedule::{HourRange, WindowState, evaluate};
use crate::core::types::ScheduleMode;
use crate::io::config::{RunnerConfig, load_config};
use crate::io::init::MissionPaths;
use crate::io::ledger_store::LedgerStore;
use crate::io::pause_store::PauseStore;
use crate::io::recurring_store::RecurringStore;
use crate::io::signals::Signals;

#[derive(Debug, Clone)]
pub struct MissionContext {
    pub paths: MissionPaths,
    pub config: RunnerConfig,
    pub zone: Tz,
    pub ledger: LedgerStore,
    pub pause: PauseStore,
    pub signals: Signals,
    pub recurring: RecurringStore,
    deep_hours: Vec<HourRange>,
    work_hours: Vec<HourRange>,
}

impl MissionContext {
    /// Resolve paths under `root` and load the config. A bad config file is an error here.
    pub fn load(root: &Path) -> Result<Self> {
        let paths = MissionPaths::new(root);
        let config = load_config(&paths.config_path)
            .with_context(|| format!("load {}", paths.config_path.display()))?;
        Ok(Self::with_config(paths, config))
    }

    pub fn with_config(paths: MissionPaths, config: RunnerConfig) -> Self {
        let zone = config.zone();
        let (deep_hours, work_hours) = config.windows();
        Self {
            ledger: LedgerStore::new(paths.ledger_path.clone()),
            pause: PauseStore::new(&paths),
            signals: Signals::new(&paths),
            recurring: RecurringStore::new(paths.recurring_path.clone()),
            paths,
            config,
            zone,
            deep_hours,
            work_hours,
        }
    }

    /// Re-read the config. A file that no longer loads keeps the previous snapshot.
    pub fn refresh(&mut self) {
        match load_config(&self.paths.config_path) {
            Ok(config) if config == self.config => {}
            Ok(config) => {
                debug!("config changed, refreshing");
                *self = Self::with_config(self.paths.clone(), config);
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "config reload failed, keeping previous");
            }
        }
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.config.pause_policy(self.zone)
    }

    pub fn windows_at(&self, now: DateTime<Utc>) -> WindowState {
        let hour = now.with_timezone(&self.zone).hour();
        evaluate(&self.deep_hours, &self.work_hours, hour)
    }

    pub fn mode_at(&self, now: DateTime<Utc>) -> ScheduleMode {
        self.windows_at(now).mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::write_config;
    use chrono::TimeZone;

    #[test]
    fn mode_uses_configured_zone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = MissionPaths::new(temp.path());
        let mut config = RunnerConfig {
            timezone: "Europe/Paris".to_string(),
            ..RunnerConfig::default()
        };
        config.schedule.deep_hours = "9-12".to_string();
        let ctx = MissionContext::with_config(paths, config);

        // 08:30 UTC is 09:30 in Paris in winter.
        let now = Utc.with_ymd_and_hms(2026, 2, 4, 8, 30, 0).single().expect("time");
        assert_eq!(ctx.mode_at(now), ScheduleMode::Deep);
        let later = Utc.with_ymd_and_hms(2026, 2, 4, 11, 30, 0).single().expect("time");
        assert_eq!(ctx.mode_at(later), ScheduleMode::Normal);
    }

    #[test]
    fn refresh_picks_up_edits_and_survives_bad_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = MissionContext::load(temp.path()).expect("load defaults");
        assert_eq!(ctx.config.max_runs_per_session, 0);

        let edited = RunnerConfig {
            max_runs_per_session: 3,
            ..RunnerConfig::default()
        };
        write_config(&ctx.paths.config_path, &edited).expect("write");
        ctx.refresh();
        assert_eq!(ctx.config.max_runs_per_session, 3);

        std::fs::write(&ctx.paths.config_path, "max_runs_per_session = \"many\"").expect("write");
        ctx.refresh();
        assert_eq!(ctx.config.max_runs_per_session, 3);
    }
}
