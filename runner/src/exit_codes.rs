//! Stable exit codes for mission-runner CLI commands.

/// Command succeeded; for `pause check`, the runner may proceed.
pub const OK: i32 = 0;
/// `pause check` found the runner still paused.
pub const BLOCKED: i32 = 1;
/// Command failed (bad layout, config, arguments, or a store error).
pub const ERROR: i32 = 2;
