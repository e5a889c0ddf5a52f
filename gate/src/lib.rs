//! Proof-of-work gate and trace lifecycle for staged agent workflows.
//!
//! Every stage (implementer, tester, guardian) runs as a separate short-lived
//! process; the filesystem is the only coordination medium. The crate keeps
//! the same split as the rest of the workspace:
//!
//! - **[`core`]**: pure logic (record parsing, gate transitions, the report
//!   classifier, command recognition). No I/O.
//! - **[`io`]**: state files, markers, trace directories and git.
//!
//! Orchestration modules ([`hook`], [`lifecycle`], [`dispatch`], [`observe`],
//! [`invalidate`], [`confirm`], [`enforce`], [`session_end`]) combine the two
//! to handle host lifecycle events.

pub mod confirm;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod enforce;
pub mod exit_codes;
pub mod hook;
pub mod invalidate;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod observe;
pub mod session_end;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transition;
