//! I/O helpers for runner commands.

pub mod atomic;
pub mod config;
pub mod executor;
pub mod init;
pub mod ledger_store;
pub mod notifier;
pub mod pause_store;
pub mod process;
pub mod recurring_store;
pub mod run_state;
pub mod session_log;
pub mod signals;
pub mod tail;
