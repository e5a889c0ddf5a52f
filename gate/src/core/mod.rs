//! Deterministic, pure logic shared by the gate.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod command;
pub mod outcome;
pub mod proof;
pub mod source_path;
pub mod trace_time;
pub mod types;
