//! Loading finalized manifests from `index.jsonl`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use workgate::core::trace_time::parse_utc;
use workgate::io::trace_store::TraceManifest;

/// Read every manifest line of an index file, oldest first.
///
/// Lines that fail to parse are skipped and reported as warnings. A missing
/// index is an empty history, not an error.
pub fn load_index(path: &Path) -> Result<(Vec<TraceManifest>, Vec<String>)> {
    if !path.exists() {
        debug!(path = %path.display(), "no index yet");
        return Ok((Vec::new(), Vec::new()));
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;

    let mut manifests = Vec::new();
    let mut warnings = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TraceManifest>(line) {
            Ok(manifest) => manifests.push(manifest),
            Err(err) => warnings.push(format!("skip {}:{}: {err}", path.display(), number + 1)),
        }
    }
    Ok((manifests, warnings))
}

/// Keep manifests started at or after `cutoff`. Unparseable timestamps are dropped.
pub fn since(manifests: Vec<TraceManifest>, cutoff: DateTime<Utc>) -> Vec<TraceManifest> {
    manifests
        .into_iter()
        .filter(|m| parse_utc(&m.started_at).is_some_and(|at| at >= cutoff))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;
    use workgate::core::trace_time::format_utc;
    use workgate::core::types::{InvocationKind, Outcome};

    pub(crate) fn manifest(
        kind: InvocationKind,
        outcome: Outcome,
        started_at: DateTime<Utc>,
        duration_secs: i64,
    ) -> TraceManifest {
        serde_json::from_value(json!({
            "trace_id": format!("{}-{}", kind.as_str(), started_at.timestamp()),
            "kind": kind,
            "session_id": "s1",
            "project": "/work/app",
            "project_hash": "0123abcd",
            "started_at": format_utc(started_at),
            "status": "finalized",
            "outcome": outcome,
            "ended_at": format_utc(started_at + Duration::seconds(duration_secs)),
            "duration_secs": duration_secs
        }))
        .expect("manifest")
    }

    #[test]
    fn missing_index_is_empty() {
        let temp = tempdir().expect("tempdir");
        let (manifests, warnings) = load_index(&temp.path().join("index.jsonl")).expect("load");
        assert!(manifests.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn bad_lines_are_skipped_with_warning() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("index.jsonl");
        let good = manifest(
            InvocationKind::Tester,
            Outcome::Success,
            Utc::now(),
            30,
        );
        let line = serde_json::to_string(&good).expect("json");
        fs::write(&path, format!("{line}\nnot json\n\n{line}\n")).expect("write");

        let (manifests, warnings) = load_index(&path).expect("load");
        assert_eq!(manifests.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains(":2:"));
    }

    #[test]
    fn since_drops_older_traces() {
        let now = Utc::now();
        let old = manifest(
            InvocationKind::Planner,
            Outcome::Success,
            now - Duration::days(10),
            5,
        );
        let recent = manifest(
            InvocationKind::Planner,
            Outcome::Crashed,
            now - Duration::hours(1),
            5,
        );
        let kept = since(vec![old, recent], now - Duration::days(7));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].outcome, Some(Outcome::Crashed));
    }
}
