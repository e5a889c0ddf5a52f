//! Completion observer: runs when a worker invocation stops.
//!
//! Finalizes the worker's trace, applies the safety-net gate entry, and for
//! testers feeds the report to the classifier. Every step re-derives state
//! from disk, so the observer is safe to run twice.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::context::GateContext;
use crate::core::classifier::classify_report;
use crate::core::proof::{GateEvent, Transition};
use crate::core::types::{InvocationKind, Outcome, ProofStatus};
use crate::hook::HookResponse;
use crate::lifecycle::finalize_active;
use crate::transition::apply_event;

#[instrument(skip_all, fields(kind = %kind, session_id = %ctx.session_id))]
pub fn on_stop(ctx: &GateContext, kind: InvocationKind) -> Result<HookResponse> {
    let finalized = finalize_active(ctx, kind);
    if !(kind.is_implementation() || kind.is_testing()) {
        return Ok(HookResponse::Allow);
    }

    let state_dir = ctx.state_dir();
    let ensured = apply_event(&state_dir, GateEvent::Ensure)?;
    if !kind.is_testing() {
        return Ok(HookResponse::Allow);
    }
    if ensured.before.is_verified() {
        debug!("proof already verified; nothing to do");
        return Ok(HookResponse::Allow);
    }
    let current = ensured
        .before
        .record()
        .map_or(ProofStatus::NeedsVerification, |record| record.status);

    let Some(finalized) = finalized else {
        return Ok(HookResponse::Advise(format!(
            "workgate: no active tester trace found; proof-of-work left at '{current}'"
        )));
    };
    let trace_id = &finalized.manifest.trace_id;
    let report = match (finalized.manifest.outcome, finalized.summary) {
        (Some(Outcome::Crashed), _) | (_, None) => {
            info!(trace_id, "tester left no report");
            return Ok(HookResponse::Advise(format!(
                "workgate: tester trace {trace_id} has no report (crashed); proof-of-work left at '{current}'"
            )));
        }
        (_, Some(report)) => report,
    };

    let classification = classify_report(&report);
    if !classification.is_accepted() {
        info!(trace_id, scope = %classification.scope, "report rejected");
        return Ok(HookResponse::Advise(format!(
            "workgate: {}\nproof-of-work left at '{current}'",
            classification.explain()
        )));
    }

    let applied = apply_event(&state_dir, GateEvent::AutoVerified)?;
    Ok(match applied.transition {
        Transition::Write(ProofStatus::Verified) => {
            info!(trace_id, "auto-verified");
            HookResponse::Advise(format!(
                "workgate: tester report {trace_id} auto-verified; proof-of-work is now 'verified'"
            ))
        }
        _ => HookResponse::Advise(format!(
            "workgate: tester report {trace_id} passed auto-verify but proof-of-work is '{}', \
             not 'pending'; nothing was promoted (no source change since dispatch?)",
            applied.before.describe()
        )),
    })
}
