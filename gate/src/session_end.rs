//! Session end: drop per-session pointers and rotate the trace index.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::context::GateContext;
use crate::io::breadcrumb::remove_breadcrumb;
use crate::io::marker::remove_session_markers;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionEndReport {
    pub breadcrumb_removed: bool,
    pub markers_removed: usize,
    pub backups_pruned: usize,
}

/// Each step runs even if an earlier one failed; the first failure is returned.
#[instrument(skip_all, fields(session_id = %ctx.session_id))]
pub fn on_session_end(ctx: &GateContext) -> Result<SessionEndReport> {
    let mut report = SessionEndReport::default();
    let mut first_err = None;

    match remove_breadcrumb(&ctx.state_dir()) {
        Ok(removed) => report.breadcrumb_removed = removed,
        Err(err) => first_err = first_err.or(Some(err)),
    }
    match remove_session_markers(&ctx.settings.trace_root, &ctx.session_id) {
        Ok(removed) => report.markers_removed = removed,
        Err(err) => first_err = first_err.or(Some(err)),
    }
    match ctx.store().rotate_backups(ctx.config().backup_keep) {
        Ok(pruned) => report.backups_pruned = pruned,
        Err(err) => first_err = first_err.or(Some(err)),
    }

    if let Some(err) = first_err {
        warn!(err = %format!("{err:#}"), "session cleanup incomplete");
        return Err(err);
    }
    info!(?report, "session ended");
    Ok(report)
}
