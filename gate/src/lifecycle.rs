//! Trace open/finalize around worker invocations.
//!
//! Tracing is best effort: when the trace store cannot be written the caller
//! continues with "no trace" and the gate logic is unaffected.

use tracing::{debug, info, instrument, warn};

use crate::context::GateContext;
use crate::core::types::InvocationKind;
use crate::io::git::Git;
use crate::io::resolver::read_resolved;
use crate::io::trace_store::{FinalizeContext, LookupPath, TraceManifest};

/// A trace that was just finalized, with the worker's report.
#[derive(Debug, Clone)]
pub struct FinalizedTrace {
    pub manifest: TraceManifest,
    pub via: LookupPath,
    pub summary: Option<String>,
}

#[instrument(skip_all, fields(kind = %kind, session_id = %ctx.session_id))]
pub fn open_trace(ctx: &GateContext, kind: InvocationKind) -> Option<String> {
    match ctx.store().open(&ctx.project, kind, &ctx.session_id) {
        Ok(trace_id) => Some(trace_id),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "trace open failed; continuing without trace");
            None
        }
    }
}

/// Locate the active trace of `kind` for this session and finalize it.
#[instrument(skip_all, fields(kind = %kind, session_id = %ctx.session_id))]
pub fn finalize_active(ctx: &GateContext, kind: InvocationKind) -> Option<FinalizedTrace> {
    let store = ctx.store();
    let located = match store.locate_active(kind, &ctx.session_id, ctx.project.hash()) {
        Ok(Some(located)) => located,
        Ok(None) => {
            info!("no active trace found");
            return None;
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "trace lookup failed");
            return None;
        }
    };
    debug!(trace_id = %located.trace_id, via = ?located.via, "active trace located");
    let manifest = finalize_trace(ctx, &located.trace_id, kind)?;
    let summary = store.read_summary(&located.trace_id).unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "summary unreadable");
        None
    });
    Some(FinalizedTrace {
        manifest,
        via: located.via,
        summary,
    })
}

/// Finalize `trace_id`, recording the changed-file count and current proof status.
pub fn finalize_trace(
    ctx: &GateContext,
    trace_id: &str,
    kind: InvocationKind,
) -> Option<TraceManifest> {
    match ctx
        .store()
        .finalize(trace_id, &ctx.project, kind, &finalize_context(ctx))
    {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            warn!(trace_id, err = %format!("{err:#}"), "trace finalize failed");
            None
        }
    }
}

/// Facts recorded at finalize time. A project outside git counts 0 changed files.
pub fn finalize_context(ctx: &GateContext) -> FinalizeContext {
    let files_changed = Git::new(ctx.project.root())
        .changed_file_count()
        .unwrap_or_else(|err| {
            debug!(err = %format!("{err:#}"), "changed-file count unavailable");
            0
        });
    let (_, proof) = read_resolved(&ctx.state_dir());
    FinalizeContext::now(Some(files_changed), proof.record().map(|r| r.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Outcome, ProofStatus};
    use std::fs;

    use crate::test_support::TestProject;

    #[test]
    fn open_then_finalize_records_proof_status() {
        let tp = TestProject::new();
        tp.write_proof("pending|10\n");
        let ctx = tp.context("s1");
        let trace_id = open_trace(&ctx, InvocationKind::Tester).expect("trace");
        fs::write(tp.store().paths(&trace_id).summary, "report").expect("summary");

        let finalized = finalize_active(&ctx, InvocationKind::Tester).expect("finalized");
        assert_eq!(finalized.manifest.trace_id, trace_id);
        assert_eq!(finalized.via, LookupPath::Marker);
        assert_eq!(finalized.manifest.proof_status, Some(ProofStatus::Pending));
        assert_eq!(finalized.manifest.files_changed, Some(0));
        assert_eq!(finalized.manifest.outcome, Some(Outcome::Partial));
        assert_eq!(finalized.summary.as_deref(), Some("report"));
    }

    #[test]
    fn unwritable_trace_root_degrades_to_no_trace() {
        let tp = TestProject::new();
        fs::write(tp.trace_root(), "not a directory").expect("block root");
        let ctx = tp.context("s1");
        assert_eq!(open_trace(&ctx, InvocationKind::Implementer), None);
        assert!(finalize_active(&ctx, InvocationKind::Implementer).is_none());
    }
}
