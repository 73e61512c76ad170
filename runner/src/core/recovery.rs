//! Crash recovery for missions left in progress.
//!
//! A run that dies mid-task leaves its entry under In Progress. On startup the
//! simple entries are moved back to the end of Pending so they run again.
//! Compound entries are left alone: resuming a multi-step task from an unknown
//! step risks redoing partial work, so a human decides what happens to them.

use crate::core::ledger::{Block, MissionEntry, MissionLedger, SectionKind};

/// Result of a recovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Entries moved back to Pending, in their In Progress order.
    pub recovered: Vec<MissionEntry>,
    /// Compound entries left untouched in In Progress.
    pub skipped_compound: usize,
    /// Orphans removed from In Progress because the same mission was already pending.
    pub dropped_duplicates: Vec<MissionEntry>,
}

/// Reclaim orphaned simple entries from In Progress. Idempotent.
///
/// Done-marked lines stay where they are. An orphan whose mission is already
/// pending is dropped from In Progress instead of being queued twice.
pub fn recover(ledger: &MissionLedger) -> (MissionLedger, Recovery) {
    let mut next = ledger.clone();
    let mut recovered = Vec::new();
    let mut dropped_duplicates = Vec::new();
    let mut skipped_compound = 0;

    let orphans: Vec<MissionEntry> = next
        .entries(SectionKind::InProgress)
        .into_iter()
        .filter(|entry| {
            if entry.compound {
                skipped_compound += 1;
                return false;
            }
            !entry.done
        })
        .cloned()
        .collect();

    for orphan in orphans {
        if next.requeue(&orphan) {
            recovered.push(orphan);
        } else {
            dropped_duplicates.push(orphan);
        }
    }

    (
        next,
        Recovery {
            recovered,
            skipped_compound,
            dropped_duplicates,
        },
    )
}

/// True when In Progress holds nothing a recovery pass would move.
pub fn is_clean(ledger: &MissionLedger) -> bool {
    ledger.section(SectionKind::InProgress).is_none_or(|section| {
        section.blocks.iter().all(|block| match block {
            Block::Entry(entry) => entry.compound || entry.done,
            _ => true,
        })
    })
}
