//! Recurring Scheduler orchestration: inject due recurring missions into the ledger.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::context::MissionContext;
use crate::core::recurring::check_and_inject;
use crate::io::ledger_store::StoreError;

/// Inject every due recurring mission into Pending and stamp the table.
///
/// Holds the recurring table lock across the ledger edit so two runners never
/// inject the same slot. The table is rewritten only when something was due.
#[instrument(skip_all)]
pub fn inject_due(ctx: &MissionContext, now: DateTime<Utc>) -> Result<Vec<String>> {
    let injected = ctx.recurring.modify(|table| {
        let mut missions = table.valid_missions();
        if missions.is_empty() {
            return Ok((Vec::new(), false));
        }
        let injected = ctx
            .ledger
            .modify(|ledger| check_and_inject(&mut missions, ledger, now, ctx.zone))?;
        if injected.is_empty() {
            return Ok((injected, false));
        }
        table.update_missions(&missions);
        Ok((injected, true))
    })?;
    for description in &injected {
        info!(mission = %description, "injected recurring mission");
    }
    Ok(injected)
}

/// [`inject_due`] for the run loop: a table that cannot be read is skipped with a warning.
pub fn inject_due_lenient(ctx: &MissionContext, now: DateTime<Utc>) -> Result<Vec<String>> {
    match inject_due(ctx, now) {
        Ok(injected) => Ok(injected),
        Err(err) if err.downcast_ref::<StoreError>().is_some() => Err(err),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "recurring table unavailable, skipping injection");
            Ok(Vec::new())
        }
    }
}
