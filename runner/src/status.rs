//! Structured status dump for `mission-runner status`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::MissionContext;
use crate::core::ledger::SectionKind;
use crate::core::types::{Frequency, ScheduleMode};
use crate::io::run_state::{RunState, load_run_state};
use crate::pause::{self, PauseStatus};

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub now: DateTime<Utc>,
    pub timezone: String,
    pub mode: ScheduleMode,
    pub pause: PauseStatus,
    pub stop_requested: bool,
    pub focus: Option<String>,
    pub heartbeat: Option<DateTime<Utc>>,
    pub ledger: LedgerCounts,
    /// Next mission the runner would pick under the current focus.
    pub next: Option<String>,
    pub recurring: Vec<RecurringStatus>,
    pub recurring_unreadable: usize,
    pub run_state: RunState,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LedgerCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub ideas: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecurringStatus {
    pub id: String,
    pub frequency: Frequency,
    pub text: String,
    pub project: Option<String>,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub due: bool,
}

/// Gather status without modifying anything.
pub fn collect(ctx: &MissionContext, now: DateTime<Utc>) -> Result<StatusReport> {
    let ledger = ctx.ledger.load()?;
    let focus = ctx.signals.focus()?;
    let table = ctx.recurring.load()?;

    let counts = LedgerCounts {
        pending: ledger.open_count(SectionKind::Pending),
        in_progress: ledger.open_count(SectionKind::InProgress),
        done: ledger.entries(SectionKind::Done).len(),
        ideas: ledger.open_count(SectionKind::Ideas),
    };
    let recurring = table
        .missions()
        .map(|mission| RecurringStatus {
            id: mission.id.clone(),
            frequency: mission.frequency,
            text: mission.text.clone(),
            project: mission.project.clone(),
            enabled: mission.enabled,
            last_run: mission.last_run,
            due: mission.is_due(now, ctx.zone),
        })
        .collect();

    Ok(StatusReport {
        now,
        timezone: ctx.zone.name().to_string(),
        mode: ctx.mode_at(now),
        pause: pause::status(ctx, now)?,
        stop_requested: ctx.signals.stop_requested(),
        heartbeat: ctx.signals.last_heartbeat()?,
        next: ledger
            .extract_next(focus.as_deref())
            .map(|entry| entry.text.clone()),
        focus,
        ledger: counts,
        recurring,
        recurring_unreadable: table.unreadable_count(),
        run_state: load_run_state(&ctx.paths.run_state_path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::MissionEntry;
    use crate::core::recurring::RecurringMission;
    use crate::test_support::{TestWorkspace, utc};

    #[test]
    fn reports_counts_next_and_due_recurring() {
        let ws = TestWorkspace::new();
        let ctx = ws.context();
        ctx.ledger
            .modify(|ledger| {
                ledger.insert_pending(MissionEntry::simple("api work", Some("api")));
                ledger.insert_pending(MissionEntry::simple("web work", Some("web")));
                ledger.add_idea(MissionEntry::simple("someday", None));
            })
            .expect("seed ledger");
        ctx.recurring
            .modify_strict(|missions| {
                missions.push(RecurringMission {
                    id: "r1".to_string(),
                    frequency: Frequency::Weekly,
                    text: "dependency audit".to_string(),
                    project: None,
                    created_at: utc(2026, 1, 1, 0, 0),
                    last_run: Some(utc(2026, 2, 1, 0, 0)),
                    enabled: true,
                });
                Ok(())
            })
            .expect("seed table");
        ctx.signals.set_focus(Some("web")).expect("focus");

        let report = collect(&ctx, utc(2026, 2, 4, 9, 0)).expect("status");
        assert_eq!(
            report.ledger,
            LedgerCounts {
                pending: 2,
                in_progress: 0,
                done: 0,
                ideas: 1,
            }
        );
        assert_eq!(report.next.as_deref(), Some("web work"));
        assert_eq!(report.focus.as_deref(), Some("web"));
        assert!(!report.recurring[0].due);
        assert!(!report.pause.paused);
        assert_eq!(report.mode, ScheduleMode::Normal);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["timezone"], "UTC");
        assert_eq!(json["mode"], "normal");
    }
}
