//! Source-write invalidation.
//!
//! Writing a source file after verification sends the gate back to `pending`.
//! Writes made while an integration-stage worker is active for the project
//! are its own bookkeeping (merge results, version bumps) and do not count.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::context::GateContext;
use crate::core::proof::{GateEvent, Transition};
use crate::core::source_path::is_source_path;
use crate::core::types::InvocationKind;
use crate::io::marker::has_fresh_marker;
use crate::io::project::Project;
use crate::transition::apply_event;

/// Apply a source write of `file` (relative paths join `cwd`).
///
/// Both the session's project and the project that owns the file are
/// invalidated. Returns the roots whose record changed.
#[instrument(skip_all, fields(file = %file.display()))]
pub fn on_source_write(ctx: &GateContext, cwd: &Path, file: &Path) -> Result<Vec<PathBuf>> {
    let joined = if file.is_absolute() {
        file.to_path_buf()
    } else {
        cwd.join(file)
    };
    let path = joined.canonicalize().unwrap_or(joined);

    let mut projects = vec![ctx.project.clone()];
    if let Some(owner) = owning_project(&path) {
        if owner != ctx.project {
            projects.push(owner);
        }
    }

    let integration_active = projects
        .iter()
        .any(|project| integration_marker_fresh(ctx, project));
    let extensions = &ctx.config().source_extensions;

    let mut moved = Vec::new();
    for project in &projects {
        let relative = path.strip_prefix(project.root()).unwrap_or(&path);
        if !is_source_path(relative, extensions) {
            debug!(project = %project.root().display(), "not a source write");
            continue;
        }
        let applied = apply_event(
            &project.state_dir(),
            GateEvent::SourceWrite { integration_active },
        )?;
        if matches!(applied.transition, Transition::Write(_)) {
            moved.push(project.root().to_path_buf());
        }
    }
    Ok(moved)
}

fn owning_project(path: &Path) -> Option<Project> {
    let parent = path.parent().filter(|dir| dir.is_dir())?;
    Project::discover(parent).ok()
}

fn integration_marker_fresh(ctx: &GateContext, project: &Project) -> bool {
    has_fresh_marker(
        &ctx.settings.trace_root,
        InvocationKind::Guardian,
        project.hash(),
        ctx.config().marker_stale_after(),
    )
    .unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "marker check failed; treating integration as inactive");
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::breadcrumb::write_breadcrumb;
    use crate::io::marker::{MarkerKey, write_marker};
    use crate::test_support::{TestProject, age_file, workspace_proof_raw};
    use std::fs;
    use std::time::Duration;

    #[test]
    fn write_after_verified_reverts_to_pending() {
        let tp = TestProject::new();
        tp.write_proof("verified|1\n");
        let moved = on_source_write(&tp.context("s1"), tp.root(), Path::new("src/lib.rs"))
            .expect("invalidate");
        assert_eq!(moved, vec![tp.root().to_path_buf()]);
        assert!(tp.proof_raw().expect("proof").starts_with("pending|"));
    }

    #[test]
    fn non_source_and_state_writes_are_ignored() {
        let tp = TestProject::new();
        tp.write_proof("verified|1\n");
        let ctx = tp.context("s1");
        for file in ["README.md", ".workgate/config.toml", "target/debug/x.rs"] {
            assert!(on_source_write(&ctx, tp.root(), Path::new(file)).expect("invalidate").is_empty());
        }
        assert_eq!(tp.proof_raw().as_deref(), Some("verified|1\n"));
    }

    #[test]
    fn fresh_guardian_marker_suppresses_invalidation() {
        let tp = TestProject::new();
        tp.write_proof("verified|1\n");
        fs::create_dir_all(tp.trace_root()).expect("mkdir");
        let marker = write_marker(
            tp.trace_root(),
            &MarkerKey::new(InvocationKind::Guardian, "other", tp.project.hash()),
            "guardian-x",
        )
        .expect("marker");
        let ctx = tp.context("s1");
        assert!(on_source_write(&ctx, tp.root(), Path::new("main.py")).expect("invalidate").is_empty());
        assert_eq!(tp.proof_raw().as_deref(), Some("verified|1\n"));

        age_file(&marker, Duration::from_secs(3 * 3600));
        on_source_write(&ctx, tp.root(), Path::new("main.py")).expect("invalidate");
        assert!(tp.proof_raw().expect("proof").starts_with("pending|"));
    }

    #[test]
    fn workspace_write_invalidates_both_views() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        write_breadcrumb(&tp.state_dir(), &workspace).expect("breadcrumb");
        fs::write(workspace.join(".workgate/proof-status"), "verified|1\n").expect("ws proof");
        tp.write_proof("verified|1\n");
        fs::create_dir_all(workspace.join("src")).expect("mkdir");
        let file = workspace.join("src/app.ts");
        fs::write(&file, "export {}").expect("file");

        on_source_write(&tp.context("s1"), tp.root(), &file).expect("invalidate");
        assert!(tp.proof_raw().expect("proof").starts_with("pending|"));
        assert!(
            workspace_proof_raw(&workspace)
                .expect("proof")
                .starts_with("pending|")
        );
    }

    #[test]
    fn missing_record_stays_missing() {
        let tp = TestProject::new();
        on_source_write(&tp.context("s1"), tp.root(), Path::new("a.rs")).expect("invalidate");
        assert_eq!(tp.proof_raw(), None);
    }
}
