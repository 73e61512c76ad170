//! Deterministic, pure logic shared by the mission runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and take the current instant as an argument, so every
//! decision here is reproducible in tests.

pub mod clock;
pub mod explore;
pub mod ledger;
pub mod quota;
pub mod recovery;
pub mod recurring;
pub mod reset_time;
pub mod schedule;
pub mod types;
