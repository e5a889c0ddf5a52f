use std::collections::BTreeMap;

use workgate::core::types::{InvocationKind, Outcome};
use workgate::io::trace_store::TraceManifest;

#[derive(Debug, Default, PartialEq)]
pub struct KindSummary {
    pub traces: usize,
    pub success: usize,
    pub partial: usize,
    pub crashed: usize,
    /// Finalized without an outcome (older writers).
    pub unknown: usize,
    pub avg_duration_secs: Option<f64>,
}

impl KindSummary {
    pub fn crash_rate(&self) -> f64 {
        if self.traces == 0 {
            return 0.0;
        }
        self.crashed as f64 / self.traces as f64
    }

    fn record(&mut self, manifest: &TraceManifest) {
        self.traces += 1;
        match manifest.outcome {
            Some(Outcome::Success) => self.success += 1,
            Some(Outcome::Partial) => self.partial += 1,
            Some(Outcome::Crashed) => self.crashed += 1,
            None => self.unknown += 1,
        }
    }
}

/// Per-kind outcome counts and mean duration.
pub fn aggregate(manifests: &[TraceManifest]) -> BTreeMap<InvocationKind, KindSummary> {
    let mut summaries: BTreeMap<InvocationKind, KindSummary> = BTreeMap::new();
    let mut durations: BTreeMap<InvocationKind, (i64, usize)> = BTreeMap::new();

    for manifest in manifests {
        summaries.entry(manifest.kind).or_default().record(manifest);
        if let Some(secs) = manifest.duration_secs {
            let entry = durations.entry(manifest.kind).or_insert((0, 0));
            entry.0 += secs;
            entry.1 += 1;
        }
    }

    for (kind, (total, count)) in durations {
        if let Some(summary) = summaries.get_mut(&kind) {
            summary.avg_duration_secs = Some(total as f64 / count as f64);
        }
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::manifest;
    use chrono::{Duration, Utc};

    #[test]
    fn aggregates_by_kind() {
        let now = Utc::now();
        let mut crashed = manifest(InvocationKind::Tester, Outcome::Crashed, now, 0);
        crashed.duration_secs = None;
        let manifests = vec![
            manifest(InvocationKind::Tester, Outcome::Success, now, 20),
            manifest(InvocationKind::Tester, Outcome::Partial, now, 40),
            crashed,
            manifest(InvocationKind::Guardian, Outcome::Success, now - Duration::hours(1), 5),
        ];

        let summaries = aggregate(&manifests);
        assert_eq!(summaries.len(), 2);

        let tester = &summaries[&InvocationKind::Tester];
        assert_eq!(tester.traces, 3);
        assert_eq!(tester.success, 1);
        assert_eq!(tester.partial, 1);
        assert_eq!(tester.crashed, 1);
        assert_eq!(tester.avg_duration_secs, Some(30.0));
        assert!((tester.crash_rate() - 1.0 / 3.0).abs() < 1e-9);

        let guardian = &summaries[&InvocationKind::Guardian];
        assert_eq!(guardian.traces, 1);
        assert_eq!(guardian.crash_rate(), 0.0);
    }

    #[test]
    fn missing_outcome_counts_as_unknown() {
        let mut m = manifest(InvocationKind::Planner, Outcome::Success, Utc::now(), 1);
        m.outcome = None;
        let summaries = aggregate(&[m]);
        assert_eq!(summaries[&InvocationKind::Planner].unknown, 1);
    }
}
