//! Pause state machine: Running -> Paused(reason, resume_at) -> Running.
//!
//! Everything here is a pure function of the pause files' contents and the
//! current instant. The orchestration in [`crate::pause`] reads the files,
//! calls [`evaluate`], and applies the resulting [`PauseDecision`].

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::core::reset_time::parse_reset_time;
use crate::core::types::{PauseReason, PauseState};

/// Phrases (lowercase) that mark an exhausted external budget in task output.
pub const EXHAUSTION_PHRASES: &[&str] = &[
    "usage limit",
    "rate limit",
    "limit reached",
    "hit your limit",
    "quota exceeded",
    "quota exhausted",
    "out of extra usage",
    "too many requests",
];

const MAX_SIGNAL_CHARS: usize = 300;
/// Lines of output after the exhaustion phrase searched for a reset time.
const SIGNAL_LINES: usize = 3;

/// Durations used when creating pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausePolicy {
    /// Pause length for manual, run-ceiling and other non-quota pauses.
    pub cooldown: Duration,
    /// Pause length for quota pauses whose reset time could not be parsed.
    pub quota_fallback: Duration,
    /// Zone for reset texts that do not name one.
    pub zone: Tz,
}

impl Default for PausePolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(5),
            quota_fallback: Duration::hours(1),
            zone: Tz::UTC,
        }
    }
}

/// Contents of the reason record as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseRecord {
    Missing,
    /// Present but unreadable (wrong line count, bad epoch).
    Corrupt(String),
    Valid(PauseState),
}

/// What the pause files say right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseSnapshot {
    pub flag_present: bool,
    pub record: PauseRecord,
}

/// What the controller should do with the current pause files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseDecision {
    /// No pause; proceed.
    Running,
    /// Paused and the resume instant is still ahead.
    Paused(PauseState),
    /// The resume instant has passed; clear the pause.
    Resume { state: PauseState, message: String },
    /// Flag and record disagree; clear both.
    Orphaned { detail: String },
}

/// Find an exhaustion phrase in `output` and return the text from it onward.
pub fn detect_exhaustion(output: &str) -> Option<&str> {
    let lowered = output.to_ascii_lowercase();
    EXHAUSTION_PHRASES
        .iter()
        .filter_map(|phrase| lowered.find(phrase))
        .min()
        .map(|pos| &output[pos..])
}

/// Build a quota pause from the exhaustion signal.
///
/// An unparseable reset time falls back to `now + quota_fallback` so the
/// runner always comes back on its own.
pub fn quota_pause(signal: &str, now: DateTime<Utc>, policy: &PausePolicy) -> PauseState {
    let signal = signal_text(signal);
    let reset = parse_reset_time(&signal, now, policy.zone);
    let resume_at = match reset.at {
        Some(at) if at > now => at,
        _ => now + policy.quota_fallback,
    };
    PauseState {
        reason: PauseReason::Quota,
        resume_at,
        display: reset.display,
    }
}

/// Build a fixed-cooldown pause (manual, run ceiling, other).
pub fn cooldown_pause(
    reason: PauseReason,
    now: DateTime<Utc>,
    policy: &PausePolicy,
    note: Option<&str>,
) -> PauseState {
    let resume_at = now + policy.cooldown;
    let display = match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(note) => note.to_string(),
        None => format!(
            "{} pause until {}",
            reason,
            resume_at.with_timezone(&policy.zone).format("%a %b %-d %H:%M")
        ),
    };
    PauseState {
        reason,
        resume_at,
        display,
    }
}

/// Resume boundary is inclusive: at exactly `resume_at` the runner may proceed.
pub fn should_auto_resume(state: &PauseState, now: DateTime<Utc>) -> bool {
    now >= state.resume_at
}

/// Whether the per-session run ceiling is reached. `max_runs == 0` means unlimited.
pub fn run_ceiling_reached(runs_since_resume: u32, max_runs: u32) -> bool {
    max_runs > 0 && runs_since_resume >= max_runs
}

/// Decide what to do with the current pause files.
pub fn evaluate(snapshot: &PauseSnapshot, now: DateTime<Utc>) -> PauseDecision {
    match (&snapshot.record, snapshot.flag_present) {
        (PauseRecord::Missing, false) => PauseDecision::Running,
        (PauseRecord::Missing, true) => PauseDecision::Orphaned {
            detail: "pause flag without reason record".to_string(),
        },
        (PauseRecord::Corrupt(err), _) => PauseDecision::Orphaned {
            detail: format!("unreadable reason record: {err}"),
        },
        (PauseRecord::Valid(_), false) => PauseDecision::Orphaned {
            detail: "reason record without pause flag".to_string(),
        },
        (PauseRecord::Valid(state), true) => {
            if should_auto_resume(state, now) {
                PauseDecision::Resume {
                    state: state.clone(),
                    message: format!("{} pause ended ({})", state.reason, state.display),
                }
            } else {
                PauseDecision::Paused(state.clone())
            }
        }
    }
}

/// The first few non-blank lines of the signal joined with spaces and bounded,
/// so a reset time on the line after the limit message is still seen.
fn signal_text(signal: &str) -> String {
    signal
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(SIGNAL_LINES)
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_SIGNAL_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 4, h, m, 0).single().expect("time")
    }

    fn state(resume_at: DateTime<Utc>) -> PauseState {
        PauseState {
            reason: PauseReason::Quota,
            resume_at,
            display: "10am".to_string(),
        }
    }

    #[test]
    fn detect_exhaustion_returns_text_from_phrase() {
        let out = "working...\nError: Usage limit reached. Resets 10am (UTC)\nbye";
        let signal = detect_exhaustion(out).expect("signal");
        assert!(signal.starts_with("Usage limit reached"));
        assert!(detect_exhaustion("all good").is_none());
    }

    #[test]
    fn quota_pause_uses_parsed_reset_time() {
        let pause = quota_pause("limit reached, resets 10am (UTC)\nmore", at(8, 0), &PausePolicy::default());
        assert_eq!(pause.reason, PauseReason::Quota);
        assert_eq!(pause.resume_at, at(10, 0));
    }

    #[test]
    fn quota_pause_reads_reset_time_from_next_line() {
        let output = "Error: Claude usage limit reached.\nYour limit will reset at 3pm (UTC).";
        let signal = detect_exhaustion(output).expect("signal");
        let pause = quota_pause(signal, at(8, 0), &PausePolicy::default());
        assert_eq!(pause.resume_at, at(15, 0));
        assert!(!pause.display.contains('\n'));
    }

    #[test]
    fn unparsed_multiline_signal_displays_on_one_line() {
        let pause = quota_pause("rate limit hit\n\nplease wait", at(8, 0), &PausePolicy::default());
        assert_eq!(pause.resume_at, at(9, 0));
        assert_eq!(pause.display, "rate limit hit please wait");
    }

    #[test]
    fn quota_pause_falls_back_to_one_hour() {
        let pause = quota_pause("rate limit, try later", at(8, 0), &PausePolicy::default());
        assert_eq!(pause.resume_at, at(9, 0));
        assert_eq!(pause.display, "rate limit, try later");
    }

    #[test]
    fn cooldown_pause_is_five_hours() {
        let pause = cooldown_pause(PauseReason::MaxRuns, at(8, 0), &PausePolicy::default(), None);
        assert_eq!(pause.resume_at, at(13, 0));
        assert!(pause.display.starts_with("max_runs pause until"));
    }

    #[test]
    fn auto_resume_boundary_is_inclusive() {
        let t = at(10, 0);
        let paused = state(t);
        assert!(!should_auto_resume(&paused, t - Duration::seconds(1)));
        assert!(should_auto_resume(&paused, t));
    }

    #[test]
    fn evaluate_heals_orphans() {
        let flag_only = PauseSnapshot {
            flag_present: true,
            record: PauseRecord::Missing,
        };
        assert!(matches!(evaluate(&flag_only, at(8, 0)), PauseDecision::Orphaned { .. }));

        let record_only = PauseSnapshot {
            flag_present: false,
            record: PauseRecord::Valid(state(at(10, 0))),
        };
        assert!(matches!(evaluate(&record_only, at(8, 0)), PauseDecision::Orphaned { .. }));

        let corrupt = PauseSnapshot {
            flag_present: true,
            record: PauseRecord::Corrupt("bad epoch".to_string()),
        };
        assert!(matches!(evaluate(&corrupt, at(8, 0)), PauseDecision::Orphaned { .. }));
    }

    #[test]
    fn evaluate_paused_then_resume() {
        let snapshot = PauseSnapshot {
            flag_present: true,
            record: PauseRecord::Valid(state(at(10, 0))),
        };
        assert!(matches!(evaluate(&snapshot, at(9, 59)), PauseDecision::Paused(_)));
        match evaluate(&snapshot, at(10, 0)) {
            PauseDecision::Resume { message, .. } => assert!(message.contains("quota")),
            other => panic!("expected resume, got {other:?}"),
        }
    }

    #[test]
    fn run_ceiling_zero_is_unlimited() {
        assert!(!run_ceiling_reached(100, 0));
        assert!(run_ceiling_reached(3, 3));
        assert!(!run_ceiling_reached(2, 3));
    }
}
