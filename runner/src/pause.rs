//! Quota/Pause Controller: applies [`crate::core::quota`] decisions to the pause files.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::context::MissionContext;
use crate::core::quota::{
    PauseDecision, PauseRecord, cooldown_pause, detect_exhaustion, evaluate, quota_pause,
    run_ceiling_reached,
};
use crate::core::types::{PauseReason, PauseState};
use crate::io::pause_store::PauseEdit;
use crate::io::run_state::{load_run_state, write_run_state};

/// Result of a pause check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Not paused.
    Running,
    /// A pause just expired and was cleared.
    Resumed { message: String },
    /// Inconsistent pause files were cleared.
    Healed { detail: String },
    /// Still paused.
    Paused(PauseState),
}

impl CheckOutcome {
    pub fn may_proceed(&self) -> bool {
        !matches!(self, CheckOutcome::Paused(_))
    }
}

/// Evaluate the pause files at `now`, auto-resuming and healing orphans.
#[instrument(skip_all)]
pub fn check(ctx: &MissionContext, now: DateTime<Utc>) -> Result<CheckOutcome> {
    let decision = ctx.pause.modify(|snapshot| {
        let decision = evaluate(snapshot, now);
        let edit = match decision {
            PauseDecision::Resume { .. } | PauseDecision::Orphaned { .. } => PauseEdit::Clear,
            PauseDecision::Running | PauseDecision::Paused(_) => PauseEdit::Keep,
        };
        (edit, decision)
    })?;
    match decision {
        PauseDecision::Running => Ok(CheckOutcome::Running),
        PauseDecision::Paused(state) => Ok(CheckOutcome::Paused(state)),
        PauseDecision::Resume { state, message } => {
            reset_run_counter(ctx)?;
            info!(reason = %state.reason, "pause expired, resuming");
            Ok(CheckOutcome::Resumed { message })
        }
        PauseDecision::Orphaned { detail } => {
            warn!(detail = %detail, "cleared orphaned pause state");
            Ok(CheckOutcome::Healed { detail })
        }
    }
}

/// Create a pause. Quota pauses with `text` parse it for a reset time; every
/// other pause uses the cooldown (or `hours`, when given).
pub fn create(
    ctx: &MissionContext,
    reason: PauseReason,
    text: Option<&str>,
    hours: Option<u32>,
    now: DateTime<Utc>,
) -> Result<PauseState> {
    let mut policy = ctx.pause_policy();
    if let Some(hours) = hours {
        policy.cooldown = Duration::hours(i64::from(hours));
        policy.quota_fallback = policy.cooldown;
    }
    let state = match (reason, text) {
        (PauseReason::Quota, Some(text)) if hours.is_none() => quota_pause(text, now, &policy),
        (_, note) => cooldown_pause(reason, now, &policy, note),
    };
    ctx.pause.write(&state)?;
    info!(reason = %state.reason, resume_at = %state.resume_at, "pause created");
    Ok(state)
}

/// Remove any pause. Returns whether one was present.
pub fn remove(ctx: &MissionContext) -> Result<bool> {
    let present = ctx.pause.modify(|snapshot| {
        let present = snapshot.flag_present || snapshot.record != PauseRecord::Missing;
        (PauseEdit::Clear, present)
    })?;
    if present {
        reset_run_counter(ctx)?;
        info!("pause removed");
    }
    Ok(present)
}

/// Pause on quota exhaustion if `output` carries an exhaustion signal.
pub fn pause_on_exhaustion(
    ctx: &MissionContext,
    output: &str,
    now: DateTime<Utc>,
) -> Result<Option<PauseState>> {
    let Some(signal) = detect_exhaustion(output) else {
        return Ok(None);
    };
    let state = quota_pause(signal, now, &ctx.pause_policy());
    ctx.pause.write(&state)?;
    warn!(resume_at = %state.resume_at, display = %state.display, "quota exhausted, pausing");
    Ok(Some(state))
}

/// Pause with a cooldown once the per-session run ceiling is reached.
pub fn pause_on_run_ceiling(
    ctx: &MissionContext,
    runs_since_resume: u32,
    now: DateTime<Utc>,
) -> Result<Option<PauseState>> {
    if !run_ceiling_reached(runs_since_resume, ctx.config.max_runs_per_session) {
        return Ok(None);
    }
    let state = cooldown_pause(PauseReason::MaxRuns, now, &ctx.pause_policy(), None);
    ctx.pause.write(&state)?;
    info!(
        runs_since_resume,
        max_runs = ctx.config.max_runs_per_session,
        "run ceiling reached, pausing"
    );
    Ok(Some(state))
}

/// Structured view for `pause status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PauseStatus {
    pub paused: bool,
    pub reason: Option<PauseReason>,
    pub resume_at: Option<DateTime<Utc>>,
    pub display: Option<String>,
    pub remaining_secs: Option<i64>,
    /// Set when the files disagree; the next check clears them.
    pub orphaned: Option<String>,
}

/// Read-only status. Never clears anything.
pub fn status(ctx: &MissionContext, now: DateTime<Utc>) -> Result<PauseStatus> {
    let snapshot = ctx.pause.snapshot().context("read pause state")?;
    let status = match evaluate(&snapshot, now) {
        PauseDecision::Running => PauseStatus {
            paused: false,
            reason: None,
            resume_at: None,
            display: None,
            remaining_secs: None,
            orphaned: None,
        },
        PauseDecision::Paused(state) | PauseDecision::Resume { state, .. } => PauseStatus {
            paused: now < state.resume_at,
            reason: Some(state.reason),
            resume_at: Some(state.resume_at),
            display: Some(state.display.clone()),
            remaining_secs: Some((state.resume_at - now).num_seconds().max(0)),
            orphaned: None,
        },
        PauseDecision::Orphaned { detail } => PauseStatus {
            paused: false,
            reason: None,
            resume_at: None,
            display: None,
            remaining_secs: None,
            orphaned: Some(detail),
        },
    };
    Ok(status)
}

fn reset_run_counter(ctx: &MissionContext) -> Result<()> {
    let mut run_state = load_run_state(&ctx.paths.run_state_path)?;
    if run_state.runs_since_resume != 0 {
        run_state.runs_since_resume = 0;
        write_run_state(&ctx.paths.run_state_path, &run_state)?;
    }
    Ok(())
}
