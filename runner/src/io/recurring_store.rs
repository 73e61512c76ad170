//! Recurring table storage (`.missions/recurring.json`).
//!
//! The file is a JSON array rewritten wholesale on every change. Rows that do
//! not deserialize are kept verbatim so a rewrite never drops them; scheduling
//! skips them with a warning and administrative edits refuse to run while any
//! are present.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tracing::warn;

use crate::core::recurring::RecurringMission;
use crate::io::atomic::{LOCK_RETRIES, lock_exclusive_with_retry, sibling, write_atomic};

/// One row of the stored table.
#[derive(Debug, Clone, PartialEq)]
pub enum RecurringRow {
    Valid(RecurringMission),
    /// Kept as read; written back unchanged.
    Unreadable(Value),
}

/// The stored table, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurringTable {
    pub rows: Vec<RecurringRow>,
}

impl RecurringTable {
    pub fn missions(&self) -> impl Iterator<Item = &RecurringMission> {
        self.rows.iter().filter_map(|row| match row {
            RecurringRow::Valid(mission) => Some(mission),
            RecurringRow::Unreadable(_) => None,
        })
    }

    pub fn unreadable_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row, RecurringRow::Unreadable(_)))
            .count()
    }

    /// Valid missions, cloned out for the scheduler.
    pub fn valid_missions(&self) -> Vec<RecurringMission> {
        self.missions().cloned().collect()
    }

    /// Replace valid rows by id with the given versions.
    pub fn update_missions(&mut self, updated: &[RecurringMission]) {
        for row in &mut self.rows {
            if let RecurringRow::Valid(mission) = row
                && let Some(next) = updated.iter().find(|u| u.id == mission.id)
            {
                *mission = next.clone();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecurringStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl RecurringStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            lock_path: sibling(&path, "lock"),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table. A missing file is an empty table.
    ///
    /// Fails only when the file exists but is not a JSON array at all.
    pub fn load(&self) -> Result<RecurringTable> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RecurringTable::default());
            }
            Err(err) => return Err(err).with_context(|| format!("read {}", self.path.display())),
        };
        if contents.trim().is_empty() {
            return Ok(RecurringTable::default());
        }
        let values: Vec<Value> = serde_json::from_str(&contents)
            .with_context(|| format!("parse {} as a JSON array", self.path.display()))?;

        let rows = values
            .into_iter()
            .enumerate()
            .map(
                |(index, value)| match serde_json::from_value::<RecurringMission>(value.clone()) {
                    Ok(mission) => RecurringRow::Valid(mission),
                    Err(err) => {
                        warn!(path = %self.path.display(), index, err = %err, "skipping unreadable recurring record");
                        RecurringRow::Unreadable(value)
                    }
                },
            )
            .collect();
        Ok(RecurringTable { rows })
    }

    /// Lock, load, apply `transform`, and write back when it returns true.
    pub fn modify<T>(
        &self,
        transform: impl FnOnce(&mut RecurringTable) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _guard = lock_exclusive_with_retry(&self.lock_path, LOCK_RETRIES)
            .with_context(|| format!("lock {}", self.lock_path.display()))?;
        let mut table = self.load()?;
        let (result, changed) = transform(&mut table)?;
        if changed {
            self.save(&table)?;
        }
        Ok(result)
    }

    /// Administrative edit over valid missions. Refuses while unreadable rows exist.
    pub fn modify_strict<T>(
        &self,
        transform: impl FnOnce(&mut Vec<RecurringMission>) -> Result<T>,
    ) -> Result<T> {
        self.modify(|table| {
            let unreadable = table.unreadable_count();
            if unreadable > 0 {
                bail!(
                    "{} has {unreadable} unreadable record(s); fix them before editing",
                    self.path.display()
                );
            }
            let mut missions = table.valid_missions();
            let result = transform(&mut missions)?;
            table.rows = missions.into_iter().map(RecurringRow::Valid).collect();
            Ok((result, true))
        })
    }

    fn save(&self, table: &RecurringTable) -> Result<()> {
        let values = table
            .rows
            .iter()
            .map(|row| match row {
                RecurringRow::Valid(mission) => serde_json::to_value(mission),
                RecurringRow::Unreadable(value) => Ok(value.clone()),
            })
            .collect::<serde_json::Result<Vec<Value>>>()
            .context("serialize recurring table")?;
        let mut buf = serde_json::to_string_pretty(&values).context("serialize recurring table")?;
        buf.push('\n');
        write_atomic(&self.path, buf.as_bytes())
            .with_context(|| format!("replace {}", self.path.display()))
    }
}

/// Find a mission by id in an administrative edit.
pub fn find_mut<'a>(
    missions: &'a mut [RecurringMission],
    id: &str,
) -> Result<&'a mut RecurringMission> {
    missions
        .iter_mut()
        .find(|mission| mission.id == id)
        .ok_or_else(|| anyhow!("no recurring mission with id '{id}'"))
}
