//! Auto-verify classification of free-text completion reports.
//!
//! Two phases: locate the report's self-declared assessment section, then
//! evaluate fixed predicates against that scope only. Every predicate must
//! hold for acceptance; any doubt rejects with itemised reasons.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Exact machine-readable token a tester emits when its run was clean.
pub const SIGNAL_TOKEN: &str = "AUTOVERIFY: CLEAN";

static ASSESSMENT_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s{0,3}#{1,6}\s+.*\b(assessment|confidence)\b").unwrap()
});

static HIGH_RE: LazyLock<Regex> = LazyLock::new(|| confidence_marker("high"));
static MEDIUM_RE: LazyLock<Regex> = LazyLock::new(|| confidence_marker("medium|moderate"));
static LOW_RE: LazyLock<Regex> = LazyLock::new(|| confidence_marker("low"));

static GAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \bpartially\b
        | \bnot\s+(?:been\s+)?tested\b
        | \buntested\b
        | \bnot\s+fully\b
        | \bnot\s+(?:been\s+)?exercised\b
        | \bnot\s+(?:been\s+)?verified\b
        | \b(?:could|can)\s*(?:not|n't)\s+(?:be\s+)?(?:test|verif)
        | \bunable\s+to\s+(?:test|verify)\b
        ",
    )
    .unwrap()
});

/// A gap only counts as an environment limit when the line says the check
/// needs something the test environment structurally lacks. Bare words like
/// "display" or "screen" are not enough.
static ENVIRONMENT_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:requires?|required|needs?|needed|needing|only\s+(?:in|on|with|via|through)|without|lacks?|lacking|no\s+access\s+to)
          \s+(?:an?\s+|the\s+)?(?:real\s+|live\s+|running\s+)?
          (?: interactive\s+(?:ui|session|terminal|tty|shell|prompt)
            | (?:web\s+)?browser
            | gui
            | display\s+server
            | (?:physical|real)\s+(?:device|hardware)
            | hardware
            | human
            | user\s+interaction
            | manual(?:ly)?\s+(?:test|inspect|verif|check)
            | visual\s+(?:inspection|check|review)
          )
        | \bon\s+(?:an?\s+)?(?:physical|real)\s+(?:device|hardware)\b
        | \bno\s+(?:display\s+server|gui|browser|tty)\s+(?:is\s+)?available\b
        ",
    )
    .unwrap()
});

static NEGATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:not|no|without|never|lacks?|lacking|cannot)\b|n't\b").unwrap()
});

/// Build the tolerant marker regex for a confidence tier.
///
/// Matches bold markup (`**High**`, `**High confidence**`), inline phrases
/// (`High confidence`, `Confidence: High`) and heading-style (`### High`).
fn confidence_marker(tier: &str) -> Regex {
    let pattern = format!(
        r"(?ix)
        \*\*\s*(?:{tier})(?:\s+confidence)?\s*\*\*
        | \b(?:{tier})\s+confidence\b
        | \bconfidence(?:\s+level)?\s*[:=\-]\s*\**\s*(?:{tier})\b
        | ^\s{{0,3}}\#{{1,6}}\s+(?:{tier})(?:\s+confidence)?\s*$
        "
    );
    Regex::new(&pattern).unwrap()
}

/// Confidence tier named by a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::High => f.write_str("high"),
            ConfidenceTier::Medium => f.write_str("medium"),
            ConfidenceTier::Low => f.write_str("low"),
        }
    }
}

/// Where the predicates were evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// From the last assessment/confidence heading (1-indexed line) to the end.
    Assessment { heading: String, line: usize },
    /// No assessment heading: the whole report was scanned.
    WholeText,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Assessment { heading, line } => {
                write!(f, "assessment section '{heading}' (line {line})")
            }
            Scope::WholeText => f.write_str("whole report (no assessment section found)"),
        }
    }
}

/// A single failed acceptance condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingSignal,
    MissingHighConfidence,
    /// A high marker preceded by a negation in the same clause.
    NegatedHighConfidence { line: String },
    LowerConfidence { tier: ConfidenceTier, line: String },
    UnexercisedCoverage { line: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingSignal => write!(f, "missing signal token '{SIGNAL_TOKEN}'"),
            Rejection::MissingHighConfidence => f.write_str("no high-confidence marker"),
            Rejection::NegatedHighConfidence { line } => {
                write!(f, "negated high-confidence marker: \"{line}\"")
            }
            Rejection::LowerConfidence { tier, line } => {
                write!(f, "{tier}-confidence marker present: \"{line}\"")
            }
            Rejection::UnexercisedCoverage { line } => {
                write!(f, "coverage gap not explained by an environment limit: \"{line}\"")
            }
        }
    }
}

/// Closed classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Vec<Rejection>),
}

/// Verdict together with the scope it was computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub scope: Scope,
    pub verdict: Verdict,
}

impl Classification {
    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accepted
    }

    /// Operator-facing explanation; one reason per line when rejected.
    pub fn explain(&self) -> String {
        match &self.verdict {
            Verdict::Accepted => format!("auto-verify accepted ({})", self.scope),
            Verdict::Rejected(reasons) => {
                let mut msg = format!("auto-verify rejected ({}):", self.scope);
                for reason in reasons {
                    msg.push_str("\n- ");
                    msg.push_str(&reason.to_string());
                }
                msg
            }
        }
    }
}

/// Classify a completion report.
pub fn classify_report(text: &str) -> Classification {
    let lines: Vec<&str> = text.lines().collect();
    let (scope, scoped) = locate_scope(&lines);

    let mut reasons = Vec::new();
    if !text.contains(SIGNAL_TOKEN) {
        reasons.push(Rejection::MissingSignal);
    }

    let mut has_high = false;
    let mut negated = Vec::new();
    for line in scoped {
        match high_marker(line) {
            Some(HighMarker::Plain) => has_high = true,
            Some(HighMarker::Negated) => negated.push(line.trim().to_string()),
            None => {}
        }
    }
    if !has_high {
        reasons.push(Rejection::MissingHighConfidence);
    }
    reasons.extend(
        negated
            .into_iter()
            .map(|line| Rejection::NegatedHighConfidence { line }),
    );

    for line in scoped {
        let tier = if MEDIUM_RE.is_match(line) {
            Some(ConfidenceTier::Medium)
        } else if LOW_RE.is_match(line) {
            Some(ConfidenceTier::Low)
        } else {
            None
        };
        if let Some(tier) = tier {
            reasons.push(Rejection::LowerConfidence {
                tier,
                line: line.trim().to_string(),
            });
        }
    }

    for line in scoped {
        if GAP_RE.is_match(line) && !ENVIRONMENT_LIMIT_RE.is_match(line) {
            reasons.push(Rejection::UnexercisedCoverage {
                line: line.trim().to_string(),
            });
        }
    }

    let verdict = if reasons.is_empty() {
        Verdict::Accepted
    } else {
        Verdict::Rejected(reasons)
    };
    Classification { scope, verdict }
}

enum HighMarker {
    Plain,
    Negated,
}

/// First high marker on the line, negated when its clause contains a negation.
fn high_marker(line: &str) -> Option<HighMarker> {
    let found = HIGH_RE.find(line)?;
    let before = &line[..found.start()];
    let clause = before.rsplit(['.', ';', '!', '?']).next().unwrap_or(before);
    Some(if NEGATION_RE.is_match(clause) {
        HighMarker::Negated
    } else {
        HighMarker::Plain
    })
}

fn locate_scope<'a, 'b>(lines: &'b [&'a str]) -> (Scope, &'b [&'a str]) {
    match lines
        .iter()
        .rposition(|line| ASSESSMENT_HEADING_RE.is_match(line))
    {
        Some(idx) => (
            Scope::Assessment {
                heading: lines[idx].trim().trim_start_matches('#').trim().to_string(),
                line: idx + 1,
            },
            &lines[idx..],
        ),
        None => (Scope::WholeText, lines),
    }
}
