//! Breadcrumb pointing a primary workspace at its active secondary worktree.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::io::state_store::{StateKey, read_optional, remove_if_exists, write_atomic};

/// Resolved meaning of the breadcrumb in a state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreadcrumbTarget {
    /// No breadcrumb, or an empty one.
    Absent,
    /// Points at a directory that no longer exists.
    Stale(PathBuf),
    /// Points at an existing workspace.
    Live(PathBuf),
}

/// Record `workspace` as the active secondary workspace.
pub fn write_breadcrumb(state_dir: &Path, workspace: &Path) -> Result<()> {
    if !workspace.is_absolute() {
        return Err(anyhow!(
            "breadcrumb target must be absolute (got {})",
            workspace.display()
        ));
    }
    write_atomic(
        &StateKey::Breadcrumb.path(state_dir),
        &format!("{}\n", workspace.display()),
    )
}

/// Raw breadcrumb path (first line, trimmed), if any.
pub fn read_breadcrumb(state_dir: &Path) -> Result<Option<PathBuf>> {
    let contents = read_optional(&StateKey::Breadcrumb.path(state_dir))?;
    Ok(contents.and_then(|raw| {
        let line = raw.lines().next().unwrap_or_default().trim();
        if line.is_empty() {
            None
        } else {
            Some(PathBuf::from(line))
        }
    }))
}

pub fn remove_breadcrumb(state_dir: &Path) -> Result<bool> {
    remove_if_exists(&StateKey::Breadcrumb.path(state_dir))
}

/// Classify the breadcrumb. Unreadable breadcrumbs count as absent.
pub fn breadcrumb_target(state_dir: &Path) -> BreadcrumbTarget {
    match read_breadcrumb(state_dir) {
        Ok(None) => BreadcrumbTarget::Absent,
        Ok(Some(path)) if path.is_dir() => BreadcrumbTarget::Live(path),
        Ok(Some(path)) => BreadcrumbTarget::Stale(path),
        Err(err) => {
            warn!(err = %err, "breadcrumb unreadable; ignoring");
            BreadcrumbTarget::Absent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn live_stale_and_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state_dir = temp.path().join(".workgate");
        assert_eq!(breadcrumb_target(&state_dir), BreadcrumbTarget::Absent);

        let wt = temp.path().join("wt");
        fs::create_dir(&wt).expect("mkdir");
        write_breadcrumb(&state_dir, &wt).expect("write");
        assert_eq!(breadcrumb_target(&state_dir), BreadcrumbTarget::Live(wt.clone()));

        fs::remove_dir(&wt).expect("rmdir");
        assert_eq!(breadcrumb_target(&state_dir), BreadcrumbTarget::Stale(wt));

        assert!(remove_breadcrumb(&state_dir).expect("remove"));
        assert_eq!(breadcrumb_target(&state_dir), BreadcrumbTarget::Absent);
    }

    #[test]
    fn relative_target_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(write_breadcrumb(temp.path(), Path::new("wt")).is_err());
    }

    #[test]
    fn blank_breadcrumb_is_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("active-worktree"), "  \n").expect("write");
        assert_eq!(breadcrumb_target(temp.path()), BreadcrumbTarget::Absent);
    }
}
