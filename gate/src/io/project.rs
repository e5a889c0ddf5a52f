//! Project identity: canonical root, state directory and hash.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::project_hash;
use crate::io::state_store::{STATE_DIR_NAME, StateKey};

/// A project (primary workspace or secondary worktree) on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
    hash: String,
}

impl Project {
    /// Find the project enclosing `start`.
    ///
    /// Walks up to the nearest directory holding `.git` (directory in a primary
    /// workspace, file in a worktree) or an existing state directory. Falls back
    /// to `start` itself.
    pub fn discover(start: &Path) -> Result<Self> {
        let canonical = start
            .canonicalize()
            .with_context(|| format!("canonicalize {}", start.display()))?;
        let mut dir = if canonical.is_dir() {
            canonical.clone()
        } else {
            canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| canonical.clone())
        };
        let fallback = dir.clone();
        loop {
            if dir.join(".git").exists() || dir.join(STATE_DIR_NAME).is_dir() {
                return Ok(Self::from_canonical(dir));
            }
            if !dir.pop() {
                return Ok(Self::from_canonical(fallback));
            }
        }
    }

    /// Use `root` as-is (canonicalized when it exists).
    pub fn at(root: &Path) -> Self {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        Self::from_canonical(root)
    }

    fn from_canonical(root: PathBuf) -> Self {
        let hash = project_hash(&root);
        Self { root, hash }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn proof_path(&self) -> PathBuf {
        StateKey::ProofStatus.path(&self.state_dir())
    }

    pub fn config_path(&self) -> PathBuf {
        StateKey::Config.path(&self.state_dir())
    }

    /// Primary workspace of a linked worktree.
    ///
    /// Read from the `gitdir:` line of the worktree's `.git` file. `None` for a
    /// primary workspace, or when the pointer cannot be read.
    pub fn primary(&self) -> Option<Project> {
        let dot_git = self.root.join(".git");
        if !dot_git.is_file() {
            return None;
        }
        let contents = fs::read_to_string(&dot_git).ok()?;
        let primary = primary_from_gitdir(&self.root, &contents)?;
        (primary != self.root).then(|| Self::at(&primary))
    }
}

/// Primary root named by a worktree `.git` file (`gitdir: <main>/.git/worktrees/<name>`).
fn primary_from_gitdir(worktree_root: &Path, contents: &str) -> Option<PathBuf> {
    let gitdir = contents
        .lines()
        .find_map(|line| line.trim().strip_prefix("gitdir:"))?
        .trim();
    if gitdir.is_empty() {
        return None;
    }
    let gitdir = worktree_root.join(gitdir);
    gitdir
        .ancestors()
        .find(|dir| dir.file_name().is_some_and(|name| name == ".git"))
        .and_then(Path::parent)
        .map(Path::to_path_buf)
}
