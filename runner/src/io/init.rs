//! Canonical `.missions/` paths and `init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::atomic::sibling;
use super::config::{RunnerConfig, write_config};
use super::run_state::{RunState, write_run_state};

/// All canonical paths within `.missions/` for a project root.
#[derive(Debug, Clone)]
pub struct MissionPaths {
    pub root: PathBuf,
    pub missions_dir: PathBuf,
    pub state_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub ledger_path: PathBuf,
    pub ledger_lock_path: PathBuf,
    pub config_path: PathBuf,
    pub recurring_path: PathBuf,
    pub recurring_lock_path: PathBuf,
    pub paused_path: PathBuf,
    pub pause_reason_path: PathBuf,
    pub pause_lock_path: PathBuf,
    pub stop_path: PathBuf,
    pub focus_path: PathBuf,
    pub heartbeat_path: PathBuf,
    pub run_state_path: PathBuf,
    pub live_log_path: PathBuf,
}

impl MissionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let missions_dir = root.join(".missions");
        let state_dir = missions_dir.join("state");
        let ledger_path = missions_dir.join("MISSIONS.md");
        let recurring_path = missions_dir.join("recurring.json");
        let pause_reason_path = state_dir.join("pause_reason");
        Self {
            root: root.clone(),
            missions_dir: missions_dir.clone(),
            state_dir: state_dir.clone(),
            sessions_dir: missions_dir.join("sessions"),
            gitignore_path: missions_dir.join(".gitignore"),
            ledger_lock_path: sibling(&ledger_path, "lock"),
            ledger_path,
            config_path: missions_dir.join("config.toml"),
            recurring_lock_path: sibling(&recurring_path, "lock"),
            recurring_path,
            paused_path: state_dir.join("paused"),
            pause_lock_path: sibling(&pause_reason_path, "lock"),
            pause_reason_path,
            stop_path: state_dir.join("stop"),
            focus_path: state_dir.join("focus"),
            heartbeat_path: state_dir.join("heartbeat"),
            run_state_path: state_dir.join("run_state.json"),
            live_log_path: missions_dir.join("live.log"),
        }
    }
}

/// Options for `init_missions`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite existing runner-owned files. The ledger is never overwritten.
    pub force: bool,
}

/// Create `.missions/` scaffolding in `root`.
///
/// Fails if `.missions/` already exists unless `options.force` is set.
pub fn init_missions(root: &Path, options: &InitOptions) -> Result<MissionPaths> {
    let paths = MissionPaths::new(root);
    if paths.missions_dir.exists() && !paths.missions_dir.is_dir() {
        return Err(anyhow!("init: .missions exists but is not a directory"));
    }
    if paths.missions_dir.exists() && !options.force {
        return Err(anyhow!(
            "init: .missions already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.missions_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.sessions_dir)?;

    write_file(&paths.gitignore_path, MISSIONS_GITIGNORE)?;
    if !paths.ledger_path.exists() {
        write_file(&paths.ledger_path, LEDGER_TEMPLATE)?;
    }
    write_config(&paths.config_path, &RunnerConfig::default())?;
    if options.force || !paths.recurring_path.exists() {
        write_file(&paths.recurring_path, "[]\n")?;
    }
    write_run_state(&paths.run_state_path, &RunState::default())?;

    info!(dir = %paths.missions_dir.display(), force = options.force, "initialized missions");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

pub(crate) const LEDGER_TEMPLATE: &str = "# Missions\n\n## Pending\n\n_(empty)_\n\n## In Progress\n\n_(empty)_\n\n## Done\n\n_(empty)_\n\n## Ideas\n\n_(empty)_\n";
const MISSIONS_GITIGNORE: &str = "state/\nsessions/\nlive.log\n*.lock\n*.tmp\n";
