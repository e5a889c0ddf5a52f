//! Applying gate events to the on-disk proof record.
//!
//! Decisions are made against the resolved record. Creation on dispatch writes
//! only the resolved file; every later write goes through the synchronizer so
//! all candidate readers agree.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::core::proof::{GateEvent, ProofRead, ProofRecord, Transition, next_transition};
use crate::io::resolver::read_resolved;
use crate::io::state_store::write_atomic;
use crate::io::sync::{replicate_delete, replicate_record};

/// Outcome of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Resolved proof file at decision time.
    pub path: PathBuf,
    pub before: ProofRead,
    pub transition: Transition,
}

#[instrument(skip_all, fields(event = ?event, state_dir = %state_dir.display()))]
pub fn apply_event(state_dir: &Path, event: GateEvent) -> Result<Applied> {
    let (path, before) = read_resolved(state_dir);
    let transition = next_transition(&before, event);
    match transition {
        Transition::Unchanged => debug!(status = %before.describe(), "gate unchanged"),
        Transition::Write(status) => {
            let record = ProofRecord::new(status, unix_now());
            if event == GateEvent::Ensure {
                write_atomic(&path, &record.render())?;
            } else {
                replicate_record(state_dir, &record)?;
            }
            info!(from = %before.describe(), to = %status, "gate moved");
        }
        Transition::Delete => {
            replicate_delete(state_dir)?;
            info!(from = %before.describe(), "gate cleared");
        }
    }
    Ok(Applied {
        path,
        before,
        transition,
    })
}

pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
