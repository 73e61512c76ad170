//! Loop-level lifecycle tests.
//!
//! These drive `run_step` and `run_loop` through several iterations with a
//! scripted executor and a manual clock to verify end-to-end behavior: quota
//! exhaustion, auto-resume, requeue order and recurring injection.

use chrono::Duration;
use rand::rngs::mock::StepRng;

use mission_runner::core::ledger::{MissionEntry, SectionKind};
use mission_runner::core::recurring::RecurringMission;
use mission_runner::core::types::{Frequency, PauseReason, TaskOutcome};
use mission_runner::io::run_state::load_run_state;
use mission_runner::looping::{LoopOptions, LoopStop, run_loop};
use mission_runner::step::{StepAction, run_step};
use mission_runner::test_support::{
    ManualClock, RecordingNotifier, ScriptedExecutor, TestWorkspace, report_failed, report_ok, utc,
};

fn never_explore() -> StepRng {
    StepRng::new(u64::MAX, 0)
}

/// Quota exhaustion pauses the runner until the provider's reset time, then
/// the requeued mission runs again and completes.
///
/// Sequence:
/// 1. 09:00 `alpha` fails with "resets 11am" → requeued behind `beta`, paused.
/// 2. 10:00 still paused, nothing runs.
/// 3. 11:00 pause expires → `beta` runs (it is now first in Pending).
/// 4. 11:05 `alpha` runs and completes.
#[test]
fn quota_pause_resume_and_requeue_order() {
    let ws = TestWorkspace::new();
    let ctx = ws.context();
    ctx.ledger
        .modify(|ledger| {
            ledger.insert_pending(MissionEntry::simple("alpha", None));
            ledger.insert_pending(MissionEntry::simple("beta", None));
        })
        .expect("seed");

    let executor = ScriptedExecutor::new(vec![
        report_failed("Claude usage limit reached · resets 11am (UTC)"),
        report_ok("beta done"),
        report_ok("alpha done"),
    ]);
    let notifier = RecordingNotifier::default();
    let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));

    let first = run_step(&ctx, &executor, &notifier, &clock, &mut never_explore()).expect("step 1");
    let StepAction::Ran(run) = &first.action else {
        panic!("expected a run, got {:?}", first.action);
    };
    assert_eq!(run.outcome, TaskOutcome::QuotaExhausted);
    assert_eq!(
        run.paused.as_ref().map(|state| state.resume_at),
        Some(utc(2026, 2, 4, 11, 0))
    );

    clock.set(utc(2026, 2, 4, 10, 0));
    let second = run_step(&ctx, &executor, &notifier, &clock, &mut never_explore()).expect("step 2");
    assert!(matches!(second.action, StepAction::Paused(ref state) if state.reason == PauseReason::Quota));

    clock.set(utc(2026, 2, 4, 11, 0));
    let third = run_step(&ctx, &executor, &notifier, &clock, &mut never_explore()).expect("step 3");
    assert!(matches!(third.action, StepAction::Ran(ref run) if run.mission == "beta"));

    clock.advance(Duration::minutes(5));
    let fourth = run_step(&ctx, &executor, &notifier, &clock, &mut never_explore()).expect("step 4");
    assert!(matches!(fourth.action, StepAction::Ran(ref run) if run.mission == "alpha"));

    let ledger = ctx.ledger.load().expect("load");
    assert_eq!(ledger.open_count(SectionKind::Pending), 0);
    let done: Vec<&str> = ledger
        .entries(SectionKind::Done)
        .iter()
        .map(|entry| entry.text.as_str())
        .collect();
    assert_eq!(done, vec!["beta", "alpha"]);

    let run_state = load_run_state(&ctx.paths.run_state_path).expect("run state");
    assert_eq!(run_state.total_runs, 3);
    assert_eq!(run_state.runs_since_resume, 2);
    assert!(!ctx.paths.paused_path.exists());
}

/// An hourly recurring mission is injected once per hour and not duplicated
/// while a copy is still pending.
#[test]
fn hourly_recurring_is_injected_and_run() {
    let ws = TestWorkspace::new();
    let mut ctx = ws.context();
    ctx.recurring
        .modify_strict(|missions| {
            missions.push(RecurringMission {
                id: "r1".to_string(),
                frequency: Frequency::Hourly,
                text: "check inbox".to_string(),
                project: Some("ops".to_string()),
                created_at: utc(2026, 2, 4, 0, 0),
                last_run: None,
                enabled: true,
            });
            Ok(())
        })
        .expect("seed table");

    let executor = ScriptedExecutor::new(vec![report_ok(""), report_ok("")]);
    let notifier = RecordingNotifier::default();
    let clock = ManualClock::new(utc(2026, 2, 4, 9, 0));
    let mut injected = Vec::new();

    let outcome = run_loop(
        &mut ctx,
        &executor,
        &notifier,
        &clock,
        &mut never_explore(),
        |_| clock.advance(Duration::minutes(30)),
        &LoopOptions {
            max_steps: Some(5),
        },
        |step| injected.extend(step.injected.clone()),
    )
    .expect("loop");

    assert_eq!(outcome.stop, LoopStop::StepLimit);
    // 09:00 inject + run, 09:00 idle, 09:30 idle, 10:00 inject + run, 10:00 idle.
    assert_eq!(outcome.tasks_run, 2);
    assert_eq!(
        injected,
        vec!["check inbox (hourly)".to_string(), "check inbox (hourly)".to_string()]
    );
    let requests = executor.requests();
    assert_eq!(requests[0].project.as_deref(), Some("ops"));
    assert!(requests[0].mission.contains("check inbox"));
}
