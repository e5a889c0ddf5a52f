//! Active-invocation markers in the trace root.
//!
//! A marker is a one-line file holding a trace id, named
//! `.active-<kind>-<session>-<project-hash>`. Freshness is judged from the file
//! mtime; markers older than the stale threshold are treated as absent.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::types::InvocationKind;
use crate::io::state_store::{StateKey, read_optional, remove_if_exists, write_atomic};

/// Identity of a marker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerKey {
    pub kind: InvocationKind,
    pub session_id: String,
    pub project_hash: String,
}

impl MarkerKey {
    pub fn new(kind: InvocationKind, session_id: &str, project_hash: &str) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            project_hash: project_hash.to_string(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}{}-{}-{}",
            StateKey::ActiveMarker.file_name(),
            self.kind,
            sanitize_session(&self.session_id),
            self.project_hash
        )
    }

    pub fn path(&self, trace_root: &Path) -> PathBuf {
        trace_root.join(self.file_name())
    }

    /// Parse a marker file name back into its key.
    ///
    /// The session part may itself contain `-`; kind is the first segment and
    /// the project hash the last.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(StateKey::ActiveMarker.file_name())?;
        let (kind, rest) = rest.split_once('-')?;
        let (session, hash) = rest.rsplit_once('-')?;
        if session.is_empty() || hash.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.parse().ok()?,
            session_id: session.to_string(),
            project_hash: hash.to_string(),
        })
    }
}

fn sanitize_session(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Write (or refresh) the marker for `key`.
pub fn write_marker(trace_root: &Path, key: &MarkerKey, trace_id: &str) -> Result<PathBuf> {
    let path = key.path(trace_root);
    write_atomic(&path, &format!("{trace_id}\n"))?;
    debug!(marker = %path.display(), trace_id, "marker written");
    Ok(path)
}

/// Trace id from a fresh marker, or `None` if missing, empty or stale.
pub fn read_fresh_marker(
    trace_root: &Path,
    key: &MarkerKey,
    stale_after: Duration,
) -> Result<Option<String>> {
    let path = key.path(trace_root);
    let Some(age) = marker_age(&path)? else {
        return Ok(None);
    };
    if age > stale_after {
        debug!(marker = %path.display(), age_secs = age.as_secs(), "marker is stale");
        return Ok(None);
    }
    let contents = read_optional(&path)?.unwrap_or_default();
    let trace_id = contents.lines().next().unwrap_or_default().trim();
    if trace_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(trace_id.to_string()))
}

pub fn remove_marker(trace_root: &Path, key: &MarkerKey) -> Result<bool> {
    remove_if_exists(&key.path(trace_root))
}

/// Remove the marker for `key` only if it still points at `trace_id`.
///
/// A newer invocation of the same kind may already have replaced it.
pub fn release_marker(trace_root: &Path, key: &MarkerKey, trace_id: &str) -> Result<bool> {
    let path = key.path(trace_root);
    match read_optional(&path)? {
        Some(raw) if raw.trim() == trace_id => remove_if_exists(&path),
        _ => Ok(false),
    }
}

/// Delete every marker whose age exceeds `stale_after`. Returns how many were removed.
pub fn sweep_stale_markers(trace_root: &Path, stale_after: Duration) -> Result<usize> {
    let mut removed = 0;
    for (path, _) in list_markers(trace_root)? {
        match marker_age(&path)? {
            Some(age) if age > stale_after => {
                if remove_if_exists(&path)? {
                    warn!(marker = %path.display(), age_secs = age.as_secs(), "removed orphaned marker");
                    removed += 1;
                }
            }
            _ => {}
        }
    }
    Ok(removed)
}

/// Remove all markers belonging to `session_id`, fresh or not.
pub fn remove_session_markers(trace_root: &Path, session_id: &str) -> Result<usize> {
    let session = sanitize_session(session_id);
    let mut removed = 0;
    for (path, key) in list_markers(trace_root)? {
        if key.session_id == session && remove_if_exists(&path)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// True if any session holds a fresh marker of `kind` for the project.
pub fn has_fresh_marker(
    trace_root: &Path,
    kind: InvocationKind,
    project_hash: &str,
    stale_after: Duration,
) -> Result<bool> {
    for (path, key) in list_markers(trace_root)? {
        if key.kind != kind || key.project_hash != project_hash {
            continue;
        }
        if let Some(age) = marker_age(&path)? {
            if age <= stale_after {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn list_markers(trace_root: &Path) -> Result<Vec<(PathBuf, MarkerKey)>> {
    let entries = match fs::read_dir(trace_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read trace root {}", trace_root.display()));
        }
    };
    let mut markers = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", trace_root.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(key) = MarkerKey::parse_file_name(&name) {
            markers.push((entry.path(), key));
        }
    }
    markers.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(markers)
}

/// Age from mtime; a missing file has no age. Future mtimes count as zero.
fn marker_age(path: &Path) -> Result<Option<Duration>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    };
    let modified = metadata
        .modified()
        .with_context(|| format!("mtime {}", path.display()))?;
    Ok(Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    ))
}
