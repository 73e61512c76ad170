//! The long-running mission loop for `mission-runner run`.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{error, info, warn};

use crate::context::MissionContext;
use crate::core::clock::Clock;
use crate::io::executor::Executor;
use crate::io::ledger_store::StoreError;
use crate::io::notifier::Notifier;
use crate::recover::recover_ledger;
use crate::step::{StepAction, StepOutcome, run_step};

const RECOVERY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Stop after this many steps (`--once` is `Some(1)`). `None` runs until stopped.
    pub max_steps: Option<u32>,
}

impl LoopOptions {
    pub fn once() -> Self {
        Self { max_steps: Some(1) }
    }
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The stop flag was honoured.
    StopRequested,
    /// `max_steps` steps were taken.
    StepLimit,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub recovered: usize,
    pub steps: u32,
    pub tasks_run: u32,
    pub stop: LoopStop,
}

/// Run steps until the stop flag is set or `options.max_steps` is reached.
///
/// Recovery runs once up front. Between steps the loop sleeps through `sleep`:
/// `poll_interval_secs` while paused, `idle_interval_secs` when there was nothing
/// to do. Retryable errors back off for `retry_backoff_secs`; a fatal store error
/// is sent to the notifier and ends the loop. In single-step mode any error is
/// returned as is.
#[allow(clippy::too_many_arguments)]
pub fn run_loop<E, N, C, R, S, F>(
    ctx: &mut MissionContext,
    executor: &E,
    notifier: &N,
    clock: &C,
    rng: &mut R,
    mut sleep: S,
    options: &LoopOptions,
    mut on_step: F,
) -> Result<LoopOutcome>
where
    E: Executor,
    N: Notifier,
    C: Clock,
    R: Rng + ?Sized,
    S: FnMut(Duration),
    F: FnMut(&StepOutcome),
{
    let recovered = recover_with_retry(ctx, notifier, &mut sleep)?;
    let mut steps = 0u32;
    let mut tasks_run = 0u32;

    loop {
        if options.max_steps.is_some_and(|max| steps >= max) {
            return Ok(LoopOutcome {
                recovered,
                steps,
                tasks_run,
                stop: LoopStop::StepLimit,
            });
        }
        ctx.refresh();

        let step = run_step(ctx, executor, notifier, clock, &mut *rng);
        steps += 1;
        let pause_for = match step {
            Ok(step) => {
                on_step(&step);
                match &step.action {
                    StepAction::Stopped => {
                        return Ok(LoopOutcome {
                            recovered,
                            steps,
                            tasks_run,
                            stop: LoopStop::StopRequested,
                        });
                    }
                    StepAction::Paused(_) => Some(secs(ctx.config.poll_interval_secs)),
                    StepAction::Rested => Some(secs(ctx.config.idle_interval_secs)),
                    StepAction::Ran(_) => {
                        tasks_run += 1;
                        None
                    }
                }
            }
            Err(err) => {
                if let Some(store) = err.downcast_ref::<StoreError>()
                    && !store.is_retryable()
                {
                    error!(err = %format!("{err:#}"), "fatal store error, stopping");
                    notifier.notify(&format!("Runner halted: {err:#}"));
                    return Err(err);
                }
                if options.max_steps == Some(1) {
                    return Err(err);
                }
                warn!(err = %format!("{err:#}"), "step failed, retrying");
                Some(secs(ctx.config.retry_backoff_secs))
            }
        };

        let more = options.max_steps.is_none_or(|max| steps < max);
        if let Some(duration) = pause_for
            && more
        {
            sleep(duration);
        }
    }
}

fn recover_with_retry<N: Notifier, S: FnMut(Duration)>(
    ctx: &MissionContext,
    notifier: &N,
    sleep: &mut S,
) -> Result<usize> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match recover_ledger(ctx) {
            Ok(report) => {
                if !report.recovered.is_empty() {
                    info!(count = report.recovered.len(), "recovered missions");
                }
                return Ok(report.recovered.len());
            }
            Err(err) if err.is_retryable() && attempt < RECOVERY_ATTEMPTS => {
                warn!(attempt, err = %err, "recovery failed, retrying");
                sleep(secs(ctx.config.retry_backoff_secs));
            }
            Err(err) => {
                notifier.notify(&format!("Runner could not start: {err}"));
                return Err(err.into());
            }
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{MissionEntry, SectionKind};
    use crate::core::types::TaskOutcome;
    use crate::test_support::{
        ManualClock, RecordingNotifier, ScriptedExecutor, TestWorkspace, report_ok, utc,
    };
    use rand::rngs::mock::StepRng;
    use std::fs;

    #[test]
    fn runs_queue_then_rests_until_step_limit() {
        let ws = TestWorkspace::with_config(|cfg| cfg.idle_interval_secs = 30);
        let mut ctx = ws.context();
        for text in ["one", "two"] {
            ctx.ledger
                .modify(|ledger| ledger.insert_pending(MissionEntry::simple(text, None)))
                .expect("add");
        }
        let executor = ScriptedExecutor::new(vec![report_ok(""), report_ok("")]);
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));
        let mut slept = Vec::new();
        let mut outcomes = Vec::new();

        let outcome = run_loop(
            &mut ctx,
            &executor,
            &notifier,
            &clock,
            &mut StepRng::new(u64::MAX, 0),
            |d| slept.push(d),
            &LoopOptions {
                max_steps: Some(4),
            },
            |step| outcomes.push(step.action.clone()),
        )
        .expect("loop");

        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.tasks_run, 2);
        assert_eq!(outcome.stop, LoopStop::StepLimit);
        assert_eq!(slept, vec![Duration::from_secs(30)]);
        assert!(matches!(outcomes[0], StepAction::Ran(ref run) if run.outcome == TaskOutcome::Success));
        assert_eq!(outcomes[3], StepAction::Rested);
        assert_eq!(
            ctx.ledger.load().expect("load").entries(SectionKind::Done).len(),
            2
        );
    }

    #[test]
    fn recovers_orphans_before_first_step() {
        let ws = TestWorkspace::new();
        ws.write_ledger("## Pending\n\n## In Progress\n\n- crashed task\n\n## Done\n");
        let mut ctx = ws.context();
        let executor = ScriptedExecutor::new(vec![report_ok("")]);
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));

        let outcome = run_loop(
            &mut ctx,
            &executor,
            &notifier,
            &clock,
            &mut StepRng::new(u64::MAX, 0),
            |_| {},
            &LoopOptions::once(),
            |_| {},
        )
        .expect("loop");

        assert_eq!(outcome.recovered, 1);
        assert_eq!(executor.requests()[0].mission, "crashed task");
    }

    #[test]
    fn stop_flag_ends_loop() {
        let ws = TestWorkspace::new();
        let mut ctx = ws.context();
        ctx.signals.request_stop().expect("stop");
        let executor = ScriptedExecutor::default();
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));

        let outcome = run_loop(
            &mut ctx,
            &executor,
            &notifier,
            &clock,
            &mut StepRng::new(u64::MAX, 0),
            |_| panic!("no sleep expected"),
            &LoopOptions::default(),
            |_| {},
        )
        .expect("loop");
        assert_eq!(outcome.stop, LoopStop::StopRequested);
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn fatal_store_error_halts_and_notifies() {
        let ws = TestWorkspace::new();
        let mut ctx = ws.context();
        fs::remove_file(&ctx.paths.ledger_path).expect("remove ledger");
        fs::create_dir(&ctx.paths.ledger_path).expect("dir in place of ledger");
        let executor = ScriptedExecutor::default();
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));

        let err = run_loop(
            &mut ctx,
            &executor,
            &notifier,
            &clock,
            &mut StepRng::new(u64::MAX, 0),
            |_| {},
            &LoopOptions::default(),
            |_| {},
        )
        .expect_err("fatal");
        assert!(err.downcast_ref::<StoreError>().is_some());
        assert_eq!(notifier.messages().len(), 1);
    }

    #[test]
    fn config_edits_apply_between_steps() {
        let ws = TestWorkspace::new();
        let mut ctx = ws.context();
        let executor = ScriptedExecutor::default();
        let notifier = RecordingNotifier::default();
        let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));
        let config_path = ctx.paths.config_path.clone();
        let mut slept = Vec::new();

        run_loop(
            &mut ctx,
            &executor,
            &notifier,
            &clock,
            &mut StepRng::new(u64::MAX, 0),
            |d| {
                slept.push(d);
                fs::write(&config_path, "idle_interval_secs = 7\n").expect("edit config");
            },
            &LoopOptions {
                max_steps: Some(3),
            },
            |_| {},
        )
        .expect("loop");
        assert_eq!(slept, vec![Duration::from_secs(300), Duration::from_secs(7)]);
    }
}
