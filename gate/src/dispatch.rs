//! Implementation dispatch: create the gate entry before work starts.
//!
//! When the dispatch names a linked secondary workspace, the breadcrumb is
//! pointed at it and the entry is created in that workspace. Otherwise the
//! entry is created in the project itself.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::context::GateContext;
use crate::core::proof::GateEvent;
use crate::io::breadcrumb::write_breadcrumb;
use crate::io::git::Git;
use crate::io::resolver::workspace_state_dir;
use crate::transition::apply_event;

/// Tool-input fields that may carry an explicit workspace path.
const WORKSPACE_FIELDS: [&str; 2] = ["worktree", "cwd"];

/// Tool-input fields scanned for a mention of a linked worktree.
const TEXT_FIELDS: [&str; 2] = ["prompt", "description"];

/// Handle an implementer dispatch. Returns the secondary workspace, if one was used.
#[instrument(skip_all, fields(project = %ctx.project.root().display()))]
pub fn on_dispatch(ctx: &GateContext, tool_input: &Value) -> Result<Option<PathBuf>> {
    match dispatch_workspace(ctx.project.root(), tool_input) {
        Some(workspace) => {
            write_breadcrumb(&ctx.state_dir(), &workspace)?;
            apply_event(&workspace_state_dir(&workspace), GateEvent::Ensure)?;
            info!(workspace = %workspace.display(), "dispatch into secondary workspace");
            Ok(Some(workspace))
        }
        None => {
            apply_event(&ctx.state_dir(), GateEvent::Ensure)?;
            Ok(None)
        }
    }
}

fn dispatch_workspace(project_root: &Path, tool_input: &Value) -> Option<PathBuf> {
    for field in WORKSPACE_FIELDS {
        let Some(raw) = tool_input.get(field).and_then(Value::as_str) else {
            continue;
        };
        let path = Path::new(raw.trim());
        if path.is_absolute() && path.is_dir() {
            let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if path != project_root {
                return Some(path);
            }
        }
    }

    let text: String = TEXT_FIELDS
        .iter()
        .filter_map(|field| tool_input.get(*field).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return None;
    }
    let worktrees = Git::new(project_root)
        .linked_worktrees()
        .unwrap_or_else(|err| {
            debug!(err = %format!("{err:#}"), "worktree list unavailable");
            Vec::new()
        });
    mentioned_worktree(&text, &worktrees)
}

/// First existing worktree whose path appears verbatim in `text`.
///
/// Longer paths are checked first so `/w/app-fix` beats `/w/app`.
pub fn mentioned_worktree(text: &str, worktrees: &[PathBuf]) -> Option<PathBuf> {
    let mut sorted: Vec<&PathBuf> = worktrees.iter().collect();
    sorted.sort_by_key(|path| std::cmp::Reverse(path.as_os_str().len()));
    sorted
        .into_iter()
        .find(|path| path.is_dir() && text.contains(&*path.to_string_lossy()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::breadcrumb::read_breadcrumb;
    use crate::test_support::{TestProject, workspace_proof_raw};
    use serde_json::json;

    #[test]
    fn plain_dispatch_creates_local_entry() {
        let tp = TestProject::new();
        let workspace = on_dispatch(&tp.context("s1"), &json!({"prompt": "do it"})).expect("dispatch");
        assert_eq!(workspace, None);
        assert!(
            tp.proof_raw()
                .expect("proof")
                .starts_with("needs-verification|")
        );
    }

    #[test]
    fn dispatch_keeps_existing_record() {
        let tp = TestProject::new();
        tp.write_proof("pending|5\n");
        on_dispatch(&tp.context("s1"), &json!({})).expect("dispatch");
        assert_eq!(tp.proof_raw().as_deref(), Some("pending|5\n"));
    }

    #[test]
    fn explicit_workspace_gets_breadcrumb_and_entry() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt-feature");
        let used = on_dispatch(
            &tp.context("s1"),
            &json!({"prompt": "implement", "worktree": workspace}),
        )
        .expect("dispatch");
        assert_eq!(used.as_deref(), Some(workspace.as_path()));
        assert_eq!(
            read_breadcrumb(&tp.state_dir()).expect("breadcrumb"),
            Some(workspace.clone())
        );
        assert!(
            workspace_proof_raw(&workspace)
                .expect("proof")
                .starts_with("needs-verification|")
        );
        assert_eq!(tp.proof_raw(), None);
    }

    #[test]
    fn mention_prefers_longest_existing_path() {
        let tp = TestProject::new();
        let short = tp.add_workspace("wt");
        let long = tp.add_workspace("wt-fix");
        let gone = tp.root().with_file_name("wt-gone-forever");
        let text = format!("work in {} please", long.display());
        assert_eq!(
            mentioned_worktree(&text, &[short.clone(), long.clone(), gone.clone()]),
            Some(long)
        );
        let text = format!("use {}", gone.display());
        assert_eq!(mentioned_worktree(&text, &[gone]), None);
        assert_eq!(mentioned_worktree("no paths here", &[short]), None);
    }
}
