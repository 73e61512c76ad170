//! Test-only helpers: scratch workspaces, scripted collaborators and a manual clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::context::MissionContext;
use crate::core::clock::Clock;
use crate::io::config::{RunnerConfig, write_config};
use crate::io::executor::{ExecReport, ExecRequest, Executor};
use crate::io::init::{InitOptions, MissionPaths, init_missions};
use crate::io::notifier::Notifier;

/// Build a UTC instant; panics on an invalid date.
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

/// An initialised `.missions/` workspace in a temp dir.
pub struct TestWorkspace {
    temp: TempDir,
    paths: MissionPaths,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_missions(temp.path(), &InitOptions::default()).expect("init missions");
        Self { temp, paths }
    }

    /// Initialise, then rewrite the config after `edit`.
    pub fn with_config(edit: impl FnOnce(&mut RunnerConfig)) -> Self {
        let ws = Self::new();
        let mut config = RunnerConfig::default();
        edit(&mut config);
        write_config(&ws.paths.config_path, &config).expect("write config");
        ws
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &MissionPaths {
        &self.paths
    }

    pub fn context(&self) -> MissionContext {
        MissionContext::load(self.root()).expect("load context")
    }

    pub fn write_ledger(&self, document: &str) {
        fs::write(&self.paths.ledger_path, document).expect("write ledger");
    }

    pub fn read_ledger(&self) -> String {
        fs::read_to_string(&self.paths.ledger_path).expect("read ledger")
    }
}

/// Successful report with `output`.
pub fn report_ok(output: &str) -> ExecReport {
    ExecReport {
        success: true,
        timed_out: false,
        exit_code: Some(0),
        duration: Duration::from_millis(5),
        output: output.to_string(),
    }
}

/// Failed report (exit code 1) with `output`.
pub fn report_failed(output: &str) -> ExecReport {
    ExecReport {
        success: false,
        timed_out: false,
        exit_code: Some(1),
        duration: Duration::from_millis(5),
        output: output.to_string(),
    }
}

pub fn report_timed_out() -> ExecReport {
    ExecReport {
        success: false,
        timed_out: true,
        exit_code: None,
        duration: Duration::from_millis(5),
        output: String::new(),
    }
}

/// Executor that replays queued reports and records every request.
///
/// Each report's output is also written to the request's stream file, like a real run.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    reports: RefCell<VecDeque<ExecReport>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(reports: Vec<ExecReport>) -> Self {
        Self {
            reports: RefCell::new(reports.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.reports.borrow().len()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecReport> {
        self.requests.borrow_mut().push(request.clone());
        let report = self
            .reports
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no report left"))?;
        if let Some(parent) = request.stream_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&request.stream_path, &report.output)?;
        Ok(report)
    }
}

/// Notifier that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: RefCell<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
