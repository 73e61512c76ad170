//! Short status notifications for the operator.
//!
//! Delivery is best effort: a failing notifier is logged and never turns into
//! a task or loop failure.

use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::io::process::run_command_with_timeout;

const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;
const NOTIFY_OUTPUT_LIMIT: usize = 4_096;

pub trait Notifier {
    fn notify(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, message: &str) {
        (**self).notify(message);
    }
}

/// Writes notifications to the tracing log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "mission_runner::notify", "{message}");
    }
}

/// Runs `notify.command` with the message appended as the last argument.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>, timeout_secs: Option<u64>) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS)),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, message: &str) {
        LogNotifier.notify(message);
        let Some((program, args)) = self.command.split_first() else {
            return;
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(message);
        match run_command_with_timeout(cmd, None, self.timeout, NOTIFY_OUTPUT_LIMIT) {
            Ok(output) if output.status.success() && !output.timed_out => {}
            Ok(output) => warn!(
                program = %program,
                exit_code = ?output.status.code(),
                timed_out = output.timed_out,
                "notify command failed"
            ),
            Err(err) => warn!(program = %program, err = %err, "notify command could not run"),
        }
    }
}

/// Notifier for the configured command, or the log when none is set.
pub fn from_config(command: &[String], timeout_secs: Option<u64>) -> Box<dyn Notifier> {
    if command.is_empty() {
        Box::new(LogNotifier)
    } else {
        Box::new(CommandNotifier::new(command.to_vec(), timeout_secs))
    }
}
