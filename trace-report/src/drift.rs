//! Success-rate regression between consecutive windows of traces.

use workgate::core::types::{InvocationKind, Outcome};
use workgate::io::trace_store::TraceManifest;

/// A kind whose recent success rate fell below the preceding window's.
#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub kind: InvocationKind,
    pub previous_rate: f64,
    pub recent_rate: f64,
    pub window: usize,
}

impl Drift {
    pub fn rate_drop(&self) -> f64 {
        self.previous_rate - self.recent_rate
    }
}

/// Compare the last `window` traces of each kind with the `window` before them.
///
/// Manifests must be in index (finalize) order. Kinds with fewer than two full
/// windows are not judged. A drop strictly greater than `threshold` is drift.
pub fn detect_drift(manifests: &[TraceManifest], window: usize, threshold: f64) -> Vec<Drift> {
    let Some(span) = window.checked_mul(2).filter(|_| window > 0) else {
        return Vec::new();
    };
    InvocationKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let outcomes: Vec<Option<Outcome>> = manifests
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.outcome)
                .collect();
            if outcomes.len() < span {
                return None;
            }
            let (previous, recent) = outcomes[outcomes.len() - span..].split_at(window);
            let drift = Drift {
                kind,
                previous_rate: success_rate(previous),
                recent_rate: success_rate(recent),
                window,
            };
            (drift.rate_drop() > threshold).then_some(drift)
        })
        .collect()
}

fn success_rate(outcomes: &[Option<Outcome>]) -> f64 {
    let successes = outcomes
        .iter()
        .filter(|o| **o == Some(Outcome::Success))
        .count();
    successes as f64 / outcomes.len() as f64
}
