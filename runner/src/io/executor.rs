//! Executor abstraction for running one mission.
//!
//! The [`Executor`] trait decouples the loop from the actual agent backend.
//! Tests use scripted executors that return predetermined reports without
//! spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_stream;

/// Parameters for an executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the executor process.
    pub workdir: PathBuf,
    /// Mission text fed to the agent.
    pub mission: String,
    pub project: Option<String>,
    pub session_id: String,
    /// File receiving stdout line by line while the task runs.
    pub stream_path: PathBuf,
    /// Maximum time to wait for the executor to complete.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What happened when a mission was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    pub success: bool,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// Captured stdout and stderr, bounded.
    pub output: String,
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run one mission. `Err` means the executor could not be run at all.
    fn exec(&self, request: &ExecRequest) -> Result<ExecReport>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn exec(&self, request: &ExecRequest) -> Result<ExecReport> {
        (**self).exec(request)
    }
}

/// Executor that spawns the configured `agent.command` with the mission on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: Vec<String>,
}

impl CommandExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(session = %request.session_id, timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecReport> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent.command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting mission");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&request.workdir)
            .env("MISSION_SESSION", &request.session_id)
            .env("MISSION_PROJECT", request.project.as_deref().unwrap_or_default());

        let started = Instant::now();
        let output = run_command_with_stream(
            cmd,
            Some(request.mission.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            Some(&request.stream_path),
        )
        .with_context(|| format!("run {program}"))?;
        let duration = started.elapsed();

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "mission timed out"
            );
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "mission failed");
        } else {
            debug!(duration_ms = duration.as_millis() as u64, "mission completed");
        }

        Ok(ExecReport {
            success: output.status.success() && !output.timed_out,
            timed_out: output.timed_out,
            exit_code: output.status.code(),
            duration,
            output: output.combined_text(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request(temp: &tempfile::TempDir, timeout: Duration) -> ExecRequest {
        ExecRequest {
            workdir: temp.path().to_path_buf(),
            mission: "fix bug".to_string(),
            project: Some("web".to_string()),
            session_id: "s-1".to_string(),
            stream_path: temp.path().join("stream.log"),
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    #[test]
    fn mission_is_fed_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = sh("printf '%s:' \"$MISSION_PROJECT\"; cat")
            .exec(&request(&temp, Duration::from_secs(10)))
            .expect("exec");
        assert!(report.success);
        assert_eq!(report.output, "web:fix bug");
        assert_eq!(report.exit_code, Some(0));
    }

    #[test]
    fn nonzero_exit_is_failure_not_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = sh("echo 'Usage limit reached' >&2; exit 3")
            .exec(&request(&temp, Duration::from_secs(10)))
            .expect("exec");
        assert!(!report.success);
        assert!(!report.timed_out);
        assert_eq!(report.exit_code, Some(3));
        assert!(report.output.contains("Usage limit reached"));
    }

    #[test]
    fn timeout_is_reported_as_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = sh("exec sleep 5")
            .exec(&request(&temp, Duration::from_millis(200)))
            .expect("exec");
        assert!(report.timed_out);
        assert!(!report.success);
    }

    #[test]
    fn missing_program_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = CommandExecutor::new(vec!["definitely-not-a-real-binary-xyz".into()]);
        assert!(executor.exec(&request(&temp, Duration::from_secs(1))).is_err());
    }
}
