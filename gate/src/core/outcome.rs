//! Outcome re-derivation for finalized traces.
//!
//! The outcome is never taken from the worker's own claim. It is recomputed
//! from which artifacts exist and what they contain.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Outcome;

static PASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:test result:\s*ok|all tests pass(?:ed)?|\b[1-9]\d*\s+(?:tests?\s+)?passed\b)|\bPASS(?:ED)?\b",
    )
    .unwrap()
});

static FAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:test result:\s*failed|\b[1-9]\d*\s+(?:tests?\s+)?failed\b|\bpanicked\b)|\bFAIL(?:ED|URE)?\b",
    )
    .unwrap()
});

/// Evidence gathered from a trace directory at finalize time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactEvidence {
    /// `summary.md` exists and is non-empty.
    pub summary_present: bool,
    /// Contents of `artifacts/test-output.txt`, if present.
    pub test_output: Option<String>,
    /// Contents of `artifacts/status.txt`, if present.
    pub status_note: Option<String>,
}

/// Derive the terminal outcome from artifact evidence.
///
/// - no summary: `crashed` (overrides everything else)
/// - test output with a pass marker and no failure marker: `success`
/// - otherwise a status note starting with `success`/`complete`/`done`: `success`
/// - anything else: `partial`
pub fn derive_outcome(evidence: &ArtifactEvidence) -> Outcome {
    if !evidence.summary_present {
        return Outcome::Crashed;
    }
    if let Some(output) = &evidence.test_output {
        return if test_output_passed(output) {
            Outcome::Success
        } else {
            Outcome::Partial
        };
    }
    if let Some(note) = &evidence.status_note {
        return if status_note_succeeded(note) {
            Outcome::Success
        } else {
            Outcome::Partial
        };
    }
    Outcome::Partial
}

fn test_output_passed(output: &str) -> bool {
    PASS_RE.is_match(output) && !FAIL_RE.is_match(output)
}

fn status_note_succeeded(note: &str) -> bool {
    let first = note
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches([':', '.', ','])
        .to_ascii_lowercase();
    matches!(first.as_str(), "success" | "complete" | "completed" | "done")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_summary() -> ArtifactEvidence {
        ArtifactEvidence {
            summary_present: true,
            ..ArtifactEvidence::default()
        }
    }

    #[test]
    fn missing_summary_is_crashed_even_with_passing_tests() {
        let evidence = ArtifactEvidence {
            summary_present: false,
            test_output: Some("test result: ok. 3 passed; 0 failed".to_string()),
            status_note: None,
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Crashed);
    }

    #[test]
    fn passing_test_output_is_success() {
        let evidence = ArtifactEvidence {
            test_output: Some("running 3 tests\ntest result: ok. 3 passed; 0 failed".to_string()),
            ..with_summary()
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Success);
    }

    #[test]
    fn failing_test_output_is_partial() {
        let evidence = ArtifactEvidence {
            test_output: Some("test result: FAILED. 2 passed; 1 failed".to_string()),
            ..with_summary()
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Partial);
    }

    #[test]
    fn test_output_without_pass_marker_is_partial() {
        let evidence = ArtifactEvidence {
            test_output: Some("0 passed; 0 failed".to_string()),
            status_note: Some("success".to_string()),
            ..with_summary()
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Partial);
    }

    #[test]
    fn status_note_is_secondary_source() {
        let evidence = ArtifactEvidence {
            status_note: Some("Complete: all steps done".to_string()),
            ..with_summary()
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Success);

        let evidence = ArtifactEvidence {
            status_note: Some("blocked on review".to_string()),
            ..with_summary()
        };
        assert_eq!(derive_outcome(&evidence), Outcome::Partial);
    }

    #[test]
    fn no_status_source_is_partial() {
        assert_eq!(derive_outcome(&with_summary()), Outcome::Partial);
    }
}
