//! Git adapter for the gate.
//!
//! Only read-only queries: change counts for trace manifests and the worktree
//! list used to detect dispatches into a secondary workspace.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Number of changed paths, ignoring the gate's own state directory.
    pub fn changed_file_count(&self) -> Result<u32> {
        let count = self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| !entry.path.starts_with(".workgate/"))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Linked worktrees of this repository, excluding the main one.
    #[instrument(skip_all)]
    pub fn linked_worktrees(&self) -> Result<Vec<PathBuf>> {
        let out = self.run_capture(&["worktree", "list", "--porcelain"])?;
        let worktrees = parse_worktree_list(&out);
        debug!(count = worktrees.len(), "linked worktrees");
        Ok(worktrees)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

/// `worktree <path>` records after the first (the main worktree comes first).
fn parse_worktree_list(out: &str) -> Vec<PathBuf> {
    out.lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .skip(1)
        .map(|path| PathBuf::from(path.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn worktree_list_skips_main() {
        let out = "worktree /work/repo\nHEAD abc\nbranch refs/heads/main\n\n\
                   worktree /work/repo-wt/feature\nHEAD def\nbranch refs/heads/feature\n\n\
                   worktree /work/repo-wt/fix\nHEAD 123\ndetached\n";
        assert_eq!(
            parse_worktree_list(out),
            vec![
                PathBuf::from("/work/repo-wt/feature"),
                PathBuf::from("/work/repo-wt/fix")
            ]
        );
    }

    #[test]
    fn git_errors_outside_a_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        assert_eq!(git.workdir(), temp.path());
        assert!(git.status_porcelain().is_err());
    }
}
