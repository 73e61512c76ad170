//! Mission and session lifecycle manager for an unattended agent runner.
//!
//! The runner works through a human-editable markdown queue of missions,
//! pauses itself when the agent's quota runs out and resumes on its own,
//! injects recurring chores, and adapts to time-of-day schedule windows.
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (ledger grammar, recovery, reset-time
//!   parsing, pause decisions, due-ness, schedule windows). No I/O.
//! - **[`io`]**: Side-effecting operations (locked file stores, flags, process
//!   execution, notifications). Isolated to enable fakes in tests.
//!
//! Orchestration modules ([`step`], [`looping`], [`pause`], [`recover`],
//! [`schedule`], [`status`]) coordinate core logic with I/O through a
//! passed-down [`context::MissionContext`] to implement CLI commands.

pub mod context;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod pause;
pub mod recover;
pub mod schedule;
pub mod status;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
