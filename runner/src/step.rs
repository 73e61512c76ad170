//! Orchestration for a single loop iteration.
//!
//! One step honours the stop flag, evaluates the pause, injects due recurring
//! missions, picks work for the current schedule window, runs it through the
//! [`Executor`] and settles the ledger, run state and session log.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::context::MissionContext;
use crate::core::clock::Clock;
use crate::core::explore::{SlotDecision, decide};
use crate::core::ledger::MissionEntry;
use crate::core::quota::detect_exhaustion;
use crate::core::types::{PauseState, ScheduleMode, TaskOutcome};
use crate::io::executor::{ExecReport, ExecRequest, Executor};
use crate::io::notifier::Notifier;
use crate::io::run_state::{load_run_state, write_run_state};
use crate::io::session_log::{SessionMeta, SessionPaths, new_session_id, write_session};
use crate::io::tail::LiveTail;
use crate::pause::{self, CheckOutcome};
use crate::schedule::inject_due_lenient;

const TAIL_INTERVAL: Duration = Duration::from_millis(500);
const TAIL_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Window mode the step ran under; `None` when it ended before picking work.
    pub mode: Option<ScheduleMode>,
    /// Recurring missions injected this step.
    pub injected: Vec<String>,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// The stop flag was set; it has been consumed.
    Stopped,
    /// Paused; nothing ran.
    Paused(PauseState),
    /// Nothing runnable and nothing to explore.
    Rested,
    Ran(TaskRun),
}

/// One executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub session_id: String,
    pub mission: String,
    pub project: Option<String>,
    pub explore: bool,
    pub outcome: TaskOutcome,
    pub duration_ms: u64,
    /// Pause created as a result of this run (quota or run ceiling).
    pub paused: Option<PauseState>,
}

/// What the step decided to run.
struct Work {
    mission: String,
    project: Option<String>,
    /// Ledger entry moved to In Progress; `None` for explore runs.
    entry: Option<MissionEntry>,
}

/// Execute one iteration of the mission loop.
#[instrument(skip_all)]
pub fn run_step<E, N, C, R>(
    ctx: &MissionContext,
    executor: &E,
    notifier: &N,
    clock: &C,
    rng: &mut R,
) -> Result<StepOutcome>
where
    E: Executor,
    N: Notifier,
    C: Clock,
    R: Rng + ?Sized,
{
    let now = clock.now();
    if ctx.signals.stop_requested() {
        ctx.signals.clear_stop()?;
        info!("stop requested, stopping");
        notifier.notify("Runner stopped on request");
        return Ok(outcome(None, Vec::new(), StepAction::Stopped));
    }

    match pause::check(ctx, now)? {
        CheckOutcome::Paused(state) => {
            debug!(resume_at = %state.resume_at, "still paused");
            return Ok(outcome(None, Vec::new(), StepAction::Paused(state)));
        }
        CheckOutcome::Resumed { message } => notifier.notify(&message),
        CheckOutcome::Healed { .. } | CheckOutcome::Running => {}
    }

    ctx.signals.beat(now)?;
    let injected = inject_due_lenient(ctx, now)?;
    if !injected.is_empty() {
        notifier.notify(&format!("Recurring missions queued: {}", injected.join(", ")));
    }

    let mode = ctx.mode_at(now);
    let focus = ctx.signals.focus()?;
    let has_runnable = ctx.ledger.load()?.extract_next(focus.as_deref()).is_some();
    let roll: f64 = rng.gen_range(0.0..1.0);
    let work = match decide(mode, has_runnable, roll, &ctx.config.explore_policy()) {
        SlotDecision::Pick => {
            let filter = focus.as_deref();
            let picked = ctx.ledger.modify(|ledger| {
                let entry = ledger.extract_next(filter)?.clone();
                ledger.start(&entry).then_some(entry)
            })?;
            picked.map(|entry| Work {
                mission: entry.mission_text(),
                project: entry.project.clone(),
                entry: Some(entry),
            })
        }
        SlotDecision::Explore(prompt) => Some(Work {
            mission: prompt,
            project: focus.clone(),
            entry: None,
        }),
        SlotDecision::Rest => None,
    };
    let Some(work) = work else {
        debug!(mode = %mode, "nothing to run");
        return Ok(outcome(Some(mode), injected, StepAction::Rested));
    };

    let run = run_task(ctx, executor, notifier, clock, mode, work, now)?;
    Ok(outcome(Some(mode), injected, StepAction::Ran(run)))
}

fn outcome(mode: Option<ScheduleMode>, injected: Vec<String>, action: StepAction) -> StepOutcome {
    StepOutcome {
        mode,
        injected,
        action,
    }
}

fn run_task<E: Executor, N: Notifier, C: Clock>(
    ctx: &MissionContext,
    executor: &E,
    notifier: &N,
    clock: &C,
    mode: ScheduleMode,
    work: Work,
    started_at: DateTime<Utc>,
) -> Result<TaskRun> {
    let explore = work.entry.is_none();
    let label = work
        .entry
        .as_ref()
        .map_or_else(|| "explore".to_string(), |entry| entry.text.clone());
    let session_id = new_session_id(started_at);
    let session = SessionPaths::new(&ctx.paths.sessions_dir, &session_id);
    fs::create_dir_all(&session.dir)
        .with_context(|| format!("create session dir {}", session.dir.display()))?;
    info!(session = %session_id, mission = %label, mode = %mode, explore, "running mission");

    let tail = LiveTail::spawn(
        session.stream_path.clone(),
        ctx.paths.live_log_path.clone(),
        &format!("=== {session_id} {label} ===\n"),
        TAIL_INTERVAL,
    );
    let request = ExecRequest {
        workdir: ctx.paths.root.clone(),
        mission: work.mission,
        project: work.project.clone(),
        session_id: session_id.clone(),
        stream_path: session.stream_path.clone(),
        timeout: Duration::from_secs(ctx.config.task_timeout_secs),
        output_limit_bytes: ctx.config.output_limit_bytes,
    };
    let report = executor.exec(&request).unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "executor could not run mission");
        ExecReport {
            success: false,
            timed_out: false,
            exit_code: None,
            duration: Duration::ZERO,
            output: format!("executor error: {err:#}\n"),
        }
    });
    if !tail.finish(TAIL_JOIN_TIMEOUT) {
        debug!("live tail detached");
    }

    let task_outcome = classify(&report);
    if let Some(entry) = &work.entry {
        settle_ledger(ctx, entry, task_outcome)?;
    }

    let ended_at = clock.now();
    let duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX);
    let mut run_state = load_run_state(&ctx.paths.run_state_path)?;
    run_state.record_run(&session_id, &label, task_outcome, duration_ms, ended_at);
    write_run_state(&ctx.paths.run_state_path, &run_state)?;

    let paused = if task_outcome == TaskOutcome::QuotaExhausted {
        pause::pause_on_exhaustion(ctx, &report.output, ended_at)?
    } else {
        pause::pause_on_run_ceiling(ctx, run_state.runs_since_resume, ended_at)?
    };

    let meta = SessionMeta {
        session_id: session_id.clone(),
        mission: label.clone(),
        project: work.project.clone(),
        explore,
        mode,
        outcome: task_outcome,
        exit_code: report.exit_code,
        started_at,
        ended_at,
        duration_ms,
    };
    if let Err(err) = write_session(&session, &meta, &report.output) {
        warn!(session = %session_id, err = %format!("{err:#}"), "session log not written");
    }

    notifier.notify(&summary(&label, task_outcome, ctx.config.task_timeout_secs));
    if let Some(state) = &paused {
        notifier.notify(&format!(
            "Paused ({}) until {}",
            state.reason, state.display
        ));
    }
    info!(
        session = %session_id,
        outcome = %task_outcome,
        duration_ms,
        "mission finished"
    );

    Ok(TaskRun {
        session_id,
        mission: label,
        project: work.project,
        explore,
        outcome: task_outcome,
        duration_ms,
        paused,
    })
}

/// Exhaustion text only counts when the run failed.
fn classify(report: &ExecReport) -> TaskOutcome {
    if report.success {
        TaskOutcome::Success
    } else if report.timed_out {
        TaskOutcome::TimedOut
    } else if detect_exhaustion(&report.output).is_some() {
        TaskOutcome::QuotaExhausted
    } else {
        TaskOutcome::Failed
    }
}

fn settle_ledger(ctx: &MissionContext, entry: &MissionEntry, outcome: TaskOutcome) -> Result<()> {
    if outcome.requeues() {
        let requeued = ctx.ledger.modify(|ledger| ledger.requeue(entry))?;
        if !requeued {
            debug!(mission = %entry.text, "already pending, dropped duplicate");
        }
    } else {
        ctx.ledger.modify(|ledger| ledger.complete(entry))?;
    }
    Ok(())
}

fn summary(label: &str, outcome: TaskOutcome, timeout_secs: u64) -> String {
    match outcome {
        TaskOutcome::Success => format!("Mission done: {label}"),
        TaskOutcome::Failed => format!("Mission failed, requeued: {label}"),
        TaskOutcome::TimedOut => {
            format!("Mission timed out after {timeout_secs}s, requeued: {label}")
        }
        TaskOutcome::QuotaExhausted => format!("Quota exhausted during: {label}"),
    }
}
