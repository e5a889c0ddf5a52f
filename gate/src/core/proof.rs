//! Proof-of-work record format and gate transitions.
//!
//! The record is a single line `status|unix_timestamp`. Anything that does not
//! parse as exactly two fields with a known status and an integer timestamp is
//! corrupt, and corrupt records are never treated as passing.

use crate::core::types::ProofStatus;

/// A structurally valid proof record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofRecord {
    pub status: ProofStatus,
    pub timestamp: u64,
}

impl ProofRecord {
    pub fn new(status: ProofStatus, timestamp: u64) -> Self {
        Self { status, timestamp }
    }

    /// Render in the on-disk format (with trailing newline).
    pub fn render(&self) -> String {
        format!("{}|{}\n", self.status, self.timestamp)
    }

    /// Parse the on-disk format, returning a stable reason on failure.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("empty record".to_string());
        }
        if trimmed.lines().count() != 1 {
            return Err("expected a single line".to_string());
        }
        let fields: Vec<&str> = trimmed.split('|').collect();
        if fields.len() != 2 {
            return Err(format!("expected 2 fields, found {}", fields.len()));
        }
        let status = fields[0].trim().parse::<ProofStatus>()?;
        let timestamp = fields[1]
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid timestamp '{}'", fields[1].trim()))?;
        Ok(Self { status, timestamp })
    }
}

/// Result of reading a proof record from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofRead {
    Missing,
    Corrupt(String),
    Valid(ProofRecord),
}

impl ProofRead {
    /// Classify raw file contents (`None` when the file does not exist).
    pub fn from_contents(contents: Option<&str>) -> Self {
        match contents {
            None => ProofRead::Missing,
            Some(raw) => match ProofRecord::parse(raw) {
                Ok(record) => ProofRead::Valid(record),
                Err(reason) => ProofRead::Corrupt(reason),
            },
        }
    }

    /// Status used for decisions: missing and corrupt collapse to `needs-verification`.
    pub fn effective_status(&self) -> ProofStatus {
        match self {
            ProofRead::Valid(record) => record.status,
            ProofRead::Missing | ProofRead::Corrupt(_) => ProofStatus::NeedsVerification,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, ProofRead::Valid(record) if record.status == ProofStatus::Verified)
    }

    pub fn record(&self) -> Option<&ProofRecord> {
        match self {
            ProofRead::Valid(record) => Some(record),
            _ => None,
        }
    }

    /// Short human label for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            ProofRead::Missing => "missing".to_string(),
            ProofRead::Corrupt(reason) => format!("corrupt ({reason})"),
            ProofRead::Valid(record) => record.status.to_string(),
        }
    }
}

/// Events that may move the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// Implementation dispatch, or a completion observer finding no record.
    Ensure,
    /// A source file was written.
    SourceWrite { integration_active: bool },
    /// The classifier accepted a completion report.
    AutoVerified,
    /// The operator typed a confirmation keyword.
    HumanConfirmed,
    /// A commit/merge went through.
    Committed,
}

/// What the caller must persist after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Write(ProofStatus),
    Delete,
}

/// Compute the gate transition for `event` given the current record.
pub fn next_transition(current: &ProofRead, event: GateEvent) -> Transition {
    use ProofStatus::{NeedsVerification, Pending, Verified};

    let status = current.record().map(|record| record.status);
    match event {
        GateEvent::Ensure => match current {
            ProofRead::Valid(_) => Transition::Unchanged,
            ProofRead::Missing | ProofRead::Corrupt(_) => Transition::Write(NeedsVerification),
        },
        GateEvent::SourceWrite {
            integration_active: true,
        } => Transition::Unchanged,
        GateEvent::SourceWrite {
            integration_active: false,
        } => match current {
            ProofRead::Missing => Transition::Unchanged,
            ProofRead::Corrupt(_) => Transition::Write(Pending),
            ProofRead::Valid(_) if status == Some(Pending) => Transition::Unchanged,
            ProofRead::Valid(_) => Transition::Write(Pending),
        },
        GateEvent::AutoVerified => match status {
            Some(Pending) => Transition::Write(Verified),
            _ => Transition::Unchanged,
        },
        GateEvent::HumanConfirmed => match status {
            Some(Verified) => Transition::Unchanged,
            _ => Transition::Write(Verified),
        },
        GateEvent::Committed => match status {
            Some(Verified) => Transition::Delete,
            _ => Transition::Unchanged,
        },
    }
}

/// Reason a commit/merge must be refused, or `None` when the record is `verified`.
pub fn commit_denial_reason(current: &ProofRead, location: &str, operation: &str) -> Option<String> {
    let guidance = "let the tester complete with an auto-verifiable report, or reply 'verified' to confirm manually";
    match current {
        ProofRead::Valid(record) if record.status == ProofStatus::Verified => None,
        ProofRead::Valid(record) => Some(format!(
            "git {operation} blocked: proof-of-work status is '{}' at {location}; {guidance}",
            record.status
        )),
        ProofRead::Missing => Some(format!(
            "git {operation} blocked: no proof-of-work record at {location}; {guidance}"
        )),
        ProofRead::Corrupt(reason) => Some(format!(
            "git {operation} blocked: proof-of-work record at {location} is corrupt ({reason}); {guidance}"
        )),
    }
}
