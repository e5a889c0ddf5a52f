//! Shared deterministic types for gate core logic.
//!
//! These types define the stable on-disk vocabulary (trace manifests, proof
//! records, markers). Their string forms are part of the file formats and
//! must not change.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role of a short-lived worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Planner,
    Implementer,
    Tester,
    Guardian,
}

impl InvocationKind {
    pub const ALL: [InvocationKind; 4] = [
        InvocationKind::Planner,
        InvocationKind::Implementer,
        InvocationKind::Tester,
        InvocationKind::Guardian,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvocationKind::Planner => "planner",
            InvocationKind::Implementer => "implementer",
            InvocationKind::Tester => "tester",
            InvocationKind::Guardian => "guardian",
        }
    }

    /// Implementation stage: dispatching it opens a gate entry.
    pub fn is_implementation(self) -> bool {
        self == InvocationKind::Implementer
    }

    /// Testing stage: its completion report feeds the auto-verify classifier.
    pub fn is_testing(self) -> bool {
        self == InvocationKind::Tester
    }

    /// Integration stage: performs commit/merge; its own writes never invalidate proof.
    pub fn is_integration(self) -> bool {
        self == InvocationKind::Guardian
    }

    /// Map a host-supplied agent type onto a kind.
    ///
    /// Accepts the canonical names plus a few stage aliases, case-insensitive.
    /// Unknown agent types are not tracked.
    pub fn from_agent_type(agent_type: &str) -> Option<Self> {
        let normalized = agent_type.trim().to_ascii_lowercase();
        let kind = match normalized.as_str() {
            "planner" | "plan" | "planning" => InvocationKind::Planner,
            "implementer" | "implementation" | "impl" | "coder" => InvocationKind::Implementer,
            "tester" | "test" | "testing" | "verifier" => InvocationKind::Tester,
            "guardian" | "integrator" | "integration" | "committer" => InvocationKind::Guardian,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvocationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown invocation kind '{s}'"))
    }
}

/// Proof-of-work gate status as persisted in the `status|timestamp` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofStatus {
    /// Orchestrator bookkeeping: work dispatched, nothing to verify yet.
    NeedsVerification,
    /// Source changed since the last verification.
    Pending,
    /// Commit/merge may proceed.
    Verified,
}

impl ProofStatus {
    pub const ALL: [ProofStatus; 3] = [
        ProofStatus::NeedsVerification,
        ProofStatus::Pending,
        ProofStatus::Verified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProofStatus::NeedsVerification => "needs-verification",
            ProofStatus::Pending => "pending",
            ProofStatus::Verified => "verified",
        }
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProofStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown proof status '{s}'"))
    }
}

/// Terminal outcome of a trace, re-derived from artifacts at finalize time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Crashed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Crashed => "crashed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a trace manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Active,
    Finalized,
}

/// Stable short identity for a project root (first 8 hex chars of SHA-256).
pub fn project_hash(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..8].to_string()
}
