//! I/O adapters: state files, markers, traces and git.

pub mod breadcrumb;
pub mod config;
pub mod git;
pub mod init;
pub mod marker;
pub mod project;
pub mod resolver;
pub mod state_store;
pub mod sync;
pub mod trace_store;
