//! Dual-write synchronizer for proof records.
//!
//! State changes readers must agree on are written to every candidate proof
//! file (resolved path first). Each write is atomic on its own; there is no
//! cross-file transaction, so readers always re-resolve at decision time.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::core::proof::ProofRecord;
use crate::io::resolver::candidate_proof_files;
use crate::io::state_store::{remove_if_exists, write_atomic};

/// Write `record` to every candidate path. Returns the paths written.
///
/// All candidates are attempted even if one fails; the first failure is
/// reported afterwards.
pub fn replicate_record(state_dir: &Path, record: &ProofRecord) -> Result<Vec<PathBuf>> {
    let rendered = record.render();
    apply_to_candidates(state_dir, |path| write_atomic(path, &rendered).map(|()| true))
        .inspect(|paths| {
            info!(status = %record.status, copies = paths.len(), "proof record replicated");
        })
}

/// Delete the record at every candidate path. Returns the paths that existed.
pub fn replicate_delete(state_dir: &Path) -> Result<Vec<PathBuf>> {
    apply_to_candidates(state_dir, remove_if_exists).inspect(|paths| {
        info!(copies = paths.len(), "proof record cleared");
    })
}

fn apply_to_candidates(
    state_dir: &Path,
    mut op: impl FnMut(&Path) -> Result<bool>,
) -> Result<Vec<PathBuf>> {
    let mut touched = Vec::new();
    let mut failures = Vec::new();
    for path in candidate_proof_files(state_dir) {
        match op(&path) {
            Ok(true) => touched.push(path),
            Ok(false) => {}
            Err(err) => {
                warn!(path = %path.display(), err = %err, "proof replication failed");
                failures.push(format!("{}: {err:#}", path.display()));
            }
        }
    }
    if !failures.is_empty() {
        return Err(anyhow!(
            "proof replication incomplete: {}",
            failures.join("; ")
        ));
    }
    Ok(touched)
}
