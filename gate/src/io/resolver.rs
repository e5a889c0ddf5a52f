//! Resolution of the authoritative proof-of-work file.
//!
//! Every reader and writer of the proof record goes through
//! [`resolve_proof_file`]. Two readers disagreeing about which file is
//! authoritative would defeat the gate.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::proof::ProofRead;
use crate::core::types::ProofStatus;
use crate::io::breadcrumb::{BreadcrumbTarget, breadcrumb_target};
use crate::io::state_store::{STATE_DIR_NAME, StateKey, read_optional};

/// State directory of a secondary workspace.
pub fn workspace_state_dir(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR_NAME)
}

/// Authoritative proof file for the project owning `state_dir`.
///
/// - no breadcrumb: project-local file
/// - breadcrumb to a deleted workspace: project-local file
/// - workspace whose record reads `pending` or `verified`: workspace file
/// - anything else: project-local file
pub fn resolve_proof_file(state_dir: &Path) -> PathBuf {
    let local = StateKey::ProofStatus.path(state_dir);
    match breadcrumb_target(state_dir) {
        BreadcrumbTarget::Absent => local,
        BreadcrumbTarget::Stale(path) => {
            debug!(workspace = %path.display(), "stale breadcrumb; using project-local proof");
            local
        }
        BreadcrumbTarget::Live(workspace) => {
            let candidate = StateKey::ProofStatus.path(&workspace_state_dir(&workspace));
            match read_proof(&candidate) {
                ProofRead::Valid(record)
                    if matches!(record.status, ProofStatus::Pending | ProofStatus::Verified) =>
                {
                    candidate
                }
                _ => local,
            }
        }
    }
}

/// Every proof file a differently-placed reader might consult, resolved path first.
pub fn candidate_proof_files(state_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![resolve_proof_file(state_dir)];
    let local = StateKey::ProofStatus.path(state_dir);
    if !candidates.contains(&local) {
        candidates.push(local);
    }
    if let BreadcrumbTarget::Live(workspace) = breadcrumb_target(state_dir) {
        let workspace_file = StateKey::ProofStatus.path(&workspace_state_dir(&workspace));
        if !candidates.contains(&workspace_file) {
            candidates.push(workspace_file);
        }
    }
    candidates
}

/// Read and validate a proof file. I/O failures other than "not found" are corrupt.
pub fn read_proof(path: &Path) -> ProofRead {
    match read_optional(path) {
        Ok(contents) => ProofRead::from_contents(contents.as_deref()),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "proof record unreadable");
            ProofRead::Corrupt(format!("unreadable: {err}"))
        }
    }
}

/// Resolve then read, in one step.
pub fn read_resolved(state_dir: &Path) -> (PathBuf, ProofRead) {
    let path = resolve_proof_file(state_dir);
    let read = read_proof(&path);
    (path, read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::breadcrumb::write_breadcrumb;
    use std::fs;

    struct Layout {
        _temp: tempfile::TempDir,
        state_dir: PathBuf,
        workspace: PathBuf,
    }

    fn layout() -> Layout {
        let temp = tempfile::tempdir().expect("tempdir");
        let state_dir = temp.path().join("main").join(".workgate");
        let workspace = temp.path().join("wt");
        fs::create_dir_all(&state_dir).expect("mkdir");
        fs::create_dir_all(workspace.join(".workgate")).expect("mkdir");
        Layout {
            _temp: temp,
            state_dir,
            workspace,
        }
    }

    fn write_workspace_proof(l: &Layout, raw: &str) {
        fs::write(l.workspace.join(".workgate/proof-status"), raw).expect("write");
    }

    #[test]
    fn no_breadcrumb_resolves_local() {
        let l = layout();
        assert_eq!(
            resolve_proof_file(&l.state_dir),
            l.state_dir.join("proof-status")
        );
    }

    #[test]
    fn active_workspace_resolves_to_workspace() {
        let l = layout();
        write_breadcrumb(&l.state_dir, &l.workspace).expect("breadcrumb");
        for raw in ["pending|1", "verified|2"] {
            write_workspace_proof(&l, raw);
            assert_eq!(
                resolve_proof_file(&l.state_dir),
                l.workspace.join(".workgate/proof-status")
            );
        }
    }

    #[test]
    fn inactive_workspace_falls_back_to_local() {
        let l = layout();
        write_breadcrumb(&l.state_dir, &l.workspace).expect("breadcrumb");
        let local = l.state_dir.join("proof-status");
        assert_eq!(resolve_proof_file(&l.state_dir), local);
        for raw in ["needs-verification|1", "verified", ""] {
            write_workspace_proof(&l, raw);
            assert_eq!(resolve_proof_file(&l.state_dir), local, "raw={raw:?}");
        }
    }

    #[test]
    fn stale_breadcrumb_falls_back_to_local() {
        let l = layout();
        write_breadcrumb(&l.state_dir, &l.workspace).expect("breadcrumb");
        write_workspace_proof(&l, "verified|2");
        fs::remove_dir_all(&l.workspace).expect("rm");
        assert_eq!(
            resolve_proof_file(&l.state_dir),
            l.state_dir.join("proof-status")
        );
        assert_eq!(
            candidate_proof_files(&l.state_dir),
            vec![l.state_dir.join("proof-status")]
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let l = layout();
        write_breadcrumb(&l.state_dir, &l.workspace).expect("breadcrumb");
        write_workspace_proof(&l, "pending|3");
        let first = resolve_proof_file(&l.state_dir);
        let second = resolve_proof_file(&l.state_dir);
        assert_eq!(first, second);
        assert_eq!(candidate_proof_files(&l.state_dir)[0], first);
    }

    #[test]
    fn candidates_cover_local_and_live_workspace() {
        let l = layout();
        write_breadcrumb(&l.state_dir, &l.workspace).expect("breadcrumb");
        let candidates = candidate_proof_files(&l.state_dir);
        assert_eq!(
            candidates,
            vec![
                l.state_dir.join("proof-status"),
                l.workspace.join(".workgate/proof-status")
            ]
        );
    }
}
