//! Commit/merge enforcement point.
//!
//! Before an integrating git command runs, the proof file for the command's
//! target project is resolved and re-read; anything but a structurally valid
//! `verified` record is refused. After the command succeeds the record and
//! breadcrumb are cleared so the next change starts from scratch.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::core::command::{IntegrationCommand, parse_integration_command};
use crate::core::proof::{GateEvent, commit_denial_reason};
use crate::hook::HookResponse;
use crate::io::breadcrumb::{read_breadcrumb, remove_breadcrumb};
use crate::io::project::Project;
use crate::io::resolver::read_resolved;
use crate::io::sync::replicate_delete;
use crate::transition::apply_event;

/// Project an integrating command operates on.
pub fn target_project(cwd: &Path, command: &IntegrationCommand) -> Result<Project> {
    let dir = match &command.target_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    };
    Project::discover(&dir)
}

/// PreToolUse check for a shell command.
#[instrument(skip_all, fields(cwd = %cwd.display()))]
pub fn check_command(cwd: &Path, command: &str) -> Result<HookResponse> {
    let Some(parsed) = parse_integration_command(command) else {
        return Ok(HookResponse::Allow);
    };
    let project = target_project(cwd, &parsed)?;
    let (path, read) = read_resolved(&project.state_dir());
    let operation = parsed.intent.as_str();
    match commit_denial_reason(&read, &path.display().to_string(), operation) {
        Some(reason) => {
            info!(operation, status = %read.describe(), "integration denied");
            Ok(HookResponse::Deny(reason))
        }
        None => {
            debug!(operation, path = %path.display(), "integration allowed");
            Ok(HookResponse::Allow)
        }
    }
}

/// PostToolUse cleanup for a shell command.
#[instrument(skip_all, fields(cwd = %cwd.display(), succeeded = succeeded))]
pub fn after_command(cwd: &Path, command: &str, succeeded: bool) -> Result<HookResponse> {
    let Some(parsed) = parse_integration_command(command) else {
        return Ok(HookResponse::Allow);
    };
    if !succeeded {
        debug!("integrating command failed; proof kept");
        return Ok(HookResponse::Allow);
    }
    let project = target_project(cwd, &parsed)?;
    let state_dir = project.state_dir();
    let applied = apply_event(&state_dir, GateEvent::Committed)?;
    let breadcrumb_removed = remove_breadcrumb(&state_dir)?;
    let primary_cleared = clear_primary_view(&project)?;
    info!(
        operation = parsed.intent.as_str(),
        before = %applied.before.describe(),
        breadcrumb_removed,
        primary_cleared,
        "post-integration cleanup"
    );
    Ok(HookResponse::Allow)
}

/// After integrating inside a linked worktree, drop the primary's copies.
///
/// Only applies when the primary's breadcrumb names this worktree: those are
/// the copies the synchronizer wrote on its behalf.
fn clear_primary_view(project: &Project) -> Result<bool> {
    let Some(primary) = project.primary() else {
        return Ok(false);
    };
    let primary_state = primary.state_dir();
    let Some(breadcrumb) = read_breadcrumb(&primary_state)? else {
        return Ok(false);
    };
    if !same_dir(&breadcrumb, project.root()) {
        debug!(breadcrumb = %breadcrumb.display(), "primary tracks another workspace");
        return Ok(false);
    }
    replicate_delete(&primary_state)?;
    remove_breadcrumb(&primary_state)?;
    Ok(true)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::breadcrumb::write_breadcrumb;
    use crate::test_support::{TestProject, workspace_proof_raw};
    use std::fs;

    fn denied(response: HookResponse) -> String {
        match response {
            HookResponse::Deny(reason) => reason,
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn non_integrating_commands_pass() {
        let tp = TestProject::new();
        for cmd in ["git status", "ls -la", "git merge --abort", "echo git commit"] {
            assert_eq!(check_command(tp.root(), cmd).expect("check"), HookResponse::Allow, "{cmd}");
        }
    }

    #[test]
    fn every_non_verified_state_is_denied() {
        let tp = TestProject::new();
        let reason = denied(check_command(tp.root(), "git commit -m x").expect("check"));
        assert!(reason.contains("no proof-of-work record"));

        tp.write_proof("verified");
        let reason = denied(check_command(tp.root(), "git commit -m x").expect("check"));
        assert!(reason.contains("corrupt"));

        tp.write_proof("pending|3\n");
        let reason = denied(check_command(tp.root(), "git merge feature").expect("check"));
        assert!(reason.starts_with("git merge blocked"));
        assert!(reason.contains("'pending'"));

        tp.write_proof("verified|3\n");
        assert_eq!(
            check_command(tp.root(), "git commit -m x").expect("check"),
            HookResponse::Allow
        );
    }

    #[test]
    fn dash_c_and_cd_target_other_project() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        fs::write(workspace.join(".workgate/proof-status"), "verified|1\n").expect("proof");

        let dash_c = format!("git -C {} commit -m x", workspace.display());
        assert_eq!(check_command(tp.root(), &dash_c).expect("check"), HookResponse::Allow);
        let cd = format!("cd {} && git commit -am x", workspace.display());
        assert_eq!(check_command(tp.root(), &cd).expect("check"), HookResponse::Allow);
        denied(check_command(tp.root(), "git commit -m x").expect("check"));
    }

    #[test]
    fn resolves_through_active_workspace() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        write_breadcrumb(&tp.state_dir(), &workspace).expect("breadcrumb");
        fs::write(workspace.join(".workgate/proof-status"), "verified|1\n").expect("proof");
        assert_eq!(
            check_command(tp.root(), "git commit -m x").expect("check"),
            HookResponse::Allow
        );
    }

    #[test]
    fn successful_commit_clears_record_and_breadcrumb() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        write_breadcrumb(&tp.state_dir(), &workspace).expect("breadcrumb");
        fs::write(workspace.join(".workgate/proof-status"), "verified|1\n").expect("proof");
        tp.write_proof("verified|1\n");

        after_command(tp.root(), "git commit -m x", true).expect("after");
        assert_eq!(tp.proof_raw(), None);
        assert_eq!(workspace_proof_raw(&workspace), None);
        assert_eq!(read_breadcrumb(&tp.state_dir()).expect("read"), None);
    }

    #[test]
    fn commit_inside_worktree_clears_primary_view() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        write_breadcrumb(&tp.state_dir(), &workspace).expect("breadcrumb");
        fs::write(workspace.join(".workgate/proof-status"), "verified|1\n").expect("proof");
        tp.write_proof("verified|1\n");

        let cmd = format!("git -C {} commit -m x", workspace.display());
        after_command(tp.root(), &cmd, true).expect("after");
        assert_eq!(workspace_proof_raw(&workspace), None);
        assert_eq!(tp.proof_raw(), None);
        assert_eq!(read_breadcrumb(&tp.state_dir()).expect("read"), None);
        denied(check_command(tp.root(), "git commit -m x").expect("check"));
    }

    #[test]
    fn worktree_commit_leaves_unrelated_primary_alone() {
        let tp = TestProject::new();
        let tracked = tp.add_workspace("wt-a");
        let other = tp.add_workspace("wt-b");
        write_breadcrumb(&tp.state_dir(), &tracked).expect("breadcrumb");
        tp.write_proof("verified|1\n");
        fs::write(other.join(".workgate/proof-status"), "verified|1\n").expect("proof");

        let cmd = format!("cd {} && git commit -m x", other.display());
        after_command(tp.root(), &cmd, true).expect("after");
        assert_eq!(workspace_proof_raw(&other), None);
        assert_eq!(tp.proof_raw().as_deref(), Some("verified|1\n"));
        assert_eq!(read_breadcrumb(&tp.state_dir()).expect("read"), Some(tracked));
    }

    #[test]
    fn failed_commit_keeps_record() {
        let tp = TestProject::new();
        tp.write_proof("verified|1\n");
        after_command(tp.root(), "git commit -m x", false).expect("after");
        assert_eq!(tp.proof_raw().as_deref(), Some("verified|1\n"));
    }
}
