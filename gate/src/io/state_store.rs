//! Single-value state files with atomic replace, plus the key registry.
//!
//! Every file the gate writes is named by a [`StateKey`]. `lint-state` walks a
//! directory and reports anything the registry does not know about, so a new
//! state file cannot appear without being added here.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Per-project state directory name.
pub const STATE_DIR_NAME: &str = ".workgate";

/// Where a key lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateScope {
    /// `<project>/.workgate/`
    Project,
    /// The global trace root.
    TraceRoot,
}

/// Registry of every state file the gate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
    /// `status|unix_timestamp` proof-of-work record.
    ProofStatus,
    /// Absolute path of the active secondary workspace.
    Breadcrumb,
    /// Project configuration.
    Config,
    /// Keeps state out of version control.
    GitIgnore,
    /// Append-only trace index.
    TraceIndex,
    /// Rotated copies of the trace index.
    IndexBackups,
    /// Active-invocation markers (`.active-<kind>-<session>-<hash>`); prefix key.
    ActiveMarker,
}

impl StateKey {
    pub const ALL: [StateKey; 7] = [
        StateKey::ProofStatus,
        StateKey::Breadcrumb,
        StateKey::Config,
        StateKey::GitIgnore,
        StateKey::TraceIndex,
        StateKey::IndexBackups,
        StateKey::ActiveMarker,
    ];

    /// File name, or file-name prefix for [`StateKey::ActiveMarker`].
    pub fn file_name(self) -> &'static str {
        match self {
            StateKey::ProofStatus => "proof-status",
            StateKey::Breadcrumb => "active-worktree",
            StateKey::Config => "config.toml",
            StateKey::GitIgnore => ".gitignore",
            StateKey::TraceIndex => "index.jsonl",
            StateKey::IndexBackups => "backups",
            StateKey::ActiveMarker => ".active-",
        }
    }

    pub fn scope(self) -> StateScope {
        match self {
            StateKey::ProofStatus
            | StateKey::Breadcrumb
            | StateKey::Config
            | StateKey::GitIgnore => StateScope::Project,
            StateKey::TraceIndex | StateKey::IndexBackups | StateKey::ActiveMarker => {
                StateScope::TraceRoot
            }
        }
    }

    pub fn path(self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    fn matches(self, name: &str) -> bool {
        match self {
            StateKey::ActiveMarker => name.starts_with(self.file_name()),
            _ => name == self.file_name(),
        }
    }

    /// Look up the registered key for a file name within `scope`.
    pub fn lookup(scope: StateScope, name: &str) -> Option<StateKey> {
        StateKey::ALL
            .into_iter()
            .find(|key| key.scope() == scope && key.matches(name))
    }
}

/// Atomically replace `path` with `contents` (temp file in the same dir + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("state path missing file name {}", path.display()))?;
    let tmp_path = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id()
    ));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    debug!(path = %path.display(), "state written");
    Ok(())
}

/// Read a state file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read state {}", path.display())),
    }
}

/// Remove a state file; returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "state removed");
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("remove state {}", path.display())),
    }
}

/// List entries in `dir` that are not registered for `scope`.
///
/// Trace directories are allowed in the trace root when `is_trace_dir` says so.
/// A missing directory has no unknown entries.
pub fn audit_state_dir(
    dir: &Path,
    scope: StateScope,
    is_trace_dir: impl Fn(&str) -> bool,
) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", dir.display())),
    };
    let mut unknown = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if StateKey::lookup(scope, &name).is_some() {
            continue;
        }
        if scope == StateScope::TraceRoot && entry.path().is_dir() && is_trace_dir(&name) {
            continue;
        }
        unknown.push(name);
    }
    unknown.sort();
    Ok(unknown)
}
