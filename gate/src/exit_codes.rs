//! Stable exit codes for workgate CLI commands.

/// Command succeeded. `hook` always exits with this code.
pub const OK: i32 = 0;
/// Invalid arguments, unreadable state or any other error.
pub const INVALID: i32 = 1;
/// `proof status` found a record that is not `verified`.
pub const NOT_VERIFIED: i32 = 2;
/// `classify` rejected the report.
pub const REJECTED: i32 = 3;
