//! Recurring missions: due-ness and injection into Pending.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::ledger::{MissionEntry, MissionLedger};
use crate::core::types::Frequency;

/// One row of the recurring table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringMission {
    pub id: String,
    pub frequency: Frequency,
    pub text: String,
    #[serde(default)]
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RecurringMission {
    /// Whether the configured interval has elapsed since `last_run`.
    ///
    /// Hourly: at least an hour since the last run. Daily: the last run's calendar
    /// date (in `zone`) is before today's. Weekly: at least seven days since the last run.
    /// Never-run entries are due; disabled entries never are.
    pub fn is_due(&self, now: DateTime<Utc>, zone: Tz) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(last_run) = self.last_run else {
            return true;
        };
        match self.frequency {
            Frequency::Hourly => now - last_run >= Duration::hours(1),
            Frequency::Daily => {
                last_run.with_timezone(&zone).date_naive() < now.with_timezone(&zone).date_naive()
            }
            Frequency::Weekly => now - last_run >= Duration::days(7),
        }
    }

    /// The Pending entry this mission injects.
    pub fn to_entry(&self) -> MissionEntry {
        let mut text = format!("[recurring:{}] ", self.frequency);
        if let Some(project) = self.project.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            text.push_str(&format!("[project:{project}] "));
        }
        text.push_str(self.text.trim());
        MissionEntry::simple(&text, None)
    }
}

/// Next free `rN` id for the table.
pub fn next_id(table: &[RecurringMission]) -> String {
    let max = table
        .iter()
        .filter_map(|mission| mission.id.strip_prefix('r')?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("r{}", max + 1)
}

/// Inject every due mission into Pending, in table order, and stamp `last_run`.
///
/// Returns the descriptions of the injected missions; an empty result means the
/// table was not modified and need not be written back. A mission already
/// pending verbatim is not inserted again but is still stamped.
pub fn check_and_inject(
    table: &mut [RecurringMission],
    ledger: &mut MissionLedger,
    now: DateTime<Utc>,
    zone: Tz,
) -> Vec<String> {
    let mut injected = Vec::new();
    for mission in table.iter_mut() {
        if !mission.is_due(now, zone) {
            continue;
        }
        let entry = mission.to_entry();
        if !ledger.has_pending(&entry) {
            ledger.insert_pending(entry);
        }
        mission.last_run = Some(now);
        injected.push(format!("{} ({})", mission.text.trim(), mission.frequency));
    }
    injected
}
