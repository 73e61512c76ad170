//! Startup recovery of missions left in progress by a crashed run.

use tracing::{info, instrument, warn};

use crate::context::MissionContext;
use crate::core::recovery::{Recovery, recover};
use crate::io::ledger_store::StoreError;

/// Run one recovery pass over the ledger under its lock.
#[instrument(skip_all)]
pub fn recover_ledger(ctx: &MissionContext) -> Result<Recovery, StoreError> {
    let report = ctx.ledger.modify(|ledger| {
        let (recovered, report) = recover(ledger);
        *ledger = recovered;
        report
    })?;
    for entry in &report.recovered {
        info!(mission = %entry.text, "recovered in-progress mission");
    }
    for entry in &report.dropped_duplicates {
        info!(mission = %entry.text, "dropped in-progress duplicate of a pending mission");
    }
    if report.skipped_compound > 0 {
        warn!(
            count = report.skipped_compound,
            "compound missions left in progress; move them by hand"
        );
    }
    Ok(report)
}
