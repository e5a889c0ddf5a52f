//! Per-invocation trace directories under the trace root.
//!
//! Layout:
//! - `<root>/<trace-id>/manifest.json` (schema-validated on every load)
//! - `<root>/<trace-id>/summary.md` written by the worker
//! - `<root>/<trace-id>/artifacts/` for test output and status notes
//! - `<root>/index.jsonl`, one finalized manifest per line
//! - `<root>/backups/` rotated index copies

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use jsonschema::validator_for;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::outcome::{ArtifactEvidence, derive_outcome};
use crate::core::trace_time::{compact_utc, duration_secs, format_utc, parse_utc};
use crate::core::types::{InvocationKind, Outcome, ProofStatus, TraceStatus};
use crate::io::marker::{MarkerKey, read_fresh_marker, release_marker, sweep_stale_markers, write_marker};
use crate::io::project::Project;
use crate::io::state_store::{StateKey, read_optional, write_atomic};

const MANIFEST_SCHEMA: &str = include_str!("../../schemas/trace_manifest.schema.json");

const ID_ATTEMPTS: usize = 8;

static TRACE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(planner|implementer|tester|guardian)-\d{8}T\d{6}Z-[0-9a-f]{6}$").unwrap()
});

/// True if `name` has the shape of a trace directory.
pub fn is_trace_id(name: &str) -> bool {
    TRACE_ID_RE.is_match(name)
}

/// On-disk trace manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceManifest {
    pub trace_id: String,
    pub kind: InvocationKind,
    pub session_id: String,
    pub project: String,
    pub project_hash: String,
    pub started_at: String,
    pub status: TraceStatus,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub files_changed: Option<u32>,
    #[serde(default)]
    pub proof_status: Option<ProofStatus>,
}

impl TraceManifest {
    pub fn is_active(&self) -> bool {
        self.status == TraceStatus::Active
    }

    fn started(&self) -> Option<DateTime<Utc>> {
        parse_utc(&self.started_at)
    }
}

/// Paths inside one trace directory.
#[derive(Debug, Clone)]
pub struct TracePaths {
    pub dir: PathBuf,
    pub manifest: PathBuf,
    pub summary: PathBuf,
    pub artifacts: PathBuf,
    pub test_output: PathBuf,
    pub status_note: PathBuf,
}

impl TracePaths {
    pub fn new(root: &Path, trace_id: &str) -> Self {
        let dir = root.join(trace_id);
        let artifacts = dir.join("artifacts");
        Self {
            manifest: dir.join("manifest.json"),
            summary: dir.join("summary.md"),
            test_output: artifacts.join("test-output.txt"),
            status_note: artifacts.join("status.txt"),
            artifacts,
            dir,
        }
    }
}

/// Which lookup layer found an active trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupPath {
    Marker,
    SessionScan,
    ProjectScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTrace {
    pub trace_id: String,
    pub via: LookupPath,
}

/// Facts gathered by the caller at finalize time.
#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub files_changed: Option<u32>,
    pub proof_status: Option<ProofStatus>,
    pub now: DateTime<Utc>,
}

impl FinalizeContext {
    pub fn now(files_changed: Option<u32>, proof_status: Option<ProofStatus>) -> Self {
        Self {
            files_changed,
            proof_status,
            now: Utc::now(),
        }
    }
}

/// Trace store rooted at the global trace root.
#[derive(Debug, Clone)]
pub struct TraceStore {
    root: PathBuf,
    stale_after: Duration,
}

impl TraceStore {
    pub fn new(root: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            root: root.into(),
            stale_after,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, trace_id: &str) -> TracePaths {
        TracePaths::new(&self.root, trace_id)
    }

    pub fn index_path(&self) -> PathBuf {
        StateKey::TraceIndex.path(&self.root)
    }

    /// Create a trace directory and manifest, then claim the active marker.
    ///
    /// Stale markers are swept first so a crashed invocation cannot shadow
    /// this one.
    #[instrument(skip_all, fields(kind = %kind, session_id = %session_id))]
    pub fn open(&self, project: &Project, kind: InvocationKind, session_id: &str) -> Result<String> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create trace root {}", self.root.display()))?;
        let now = Utc::now();
        let (trace_id, paths) = self.allocate(kind, now)?;
        fs::create_dir_all(&paths.artifacts)
            .with_context(|| format!("create {}", paths.artifacts.display()))?;

        let manifest = TraceManifest {
            trace_id: trace_id.clone(),
            kind,
            session_id: session_id.to_string(),
            project: project.root().display().to_string(),
            project_hash: project.hash().to_string(),
            started_at: format_utc(now),
            status: TraceStatus::Active,
            outcome: None,
            ended_at: None,
            duration_secs: None,
            files_changed: None,
            proof_status: None,
        };
        write_manifest(&paths.manifest, &manifest)?;

        match sweep_stale_markers(&self.root, self.stale_after) {
            Ok(0) => {}
            Ok(swept) => info!(swept, "swept stale markers"),
            Err(err) => warn!(err = %err, "marker sweep failed"),
        }
        write_marker(
            &self.root,
            &MarkerKey::new(kind, session_id, project.hash()),
            &trace_id,
        )?;
        info!(trace_id, project = %project.root().display(), "trace opened");
        Ok(trace_id)
    }

    /// Reserve a fresh trace id; `create_dir` fails on collision so we retry.
    fn allocate(&self, kind: InvocationKind, now: DateTime<Utc>) -> Result<(String, TracePaths)> {
        for _ in 0..ID_ATTEMPTS {
            let suffix = rand::random::<u32>() & 0x00ff_ffff;
            let trace_id = format!("{kind}-{}-{suffix:06x}", compact_utc(now));
            let paths = self.paths(&trace_id);
            match fs::create_dir(&paths.dir) {
                Ok(()) => return Ok((trace_id, paths)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(trace_id, "trace id collision");
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create {}", paths.dir.display()));
                }
            }
        }
        Err(anyhow!(
            "could not allocate a unique trace id after {ID_ATTEMPTS} attempts"
        ))
    }

    /// Mark a trace finalized, re-deriving its outcome from artifacts.
    ///
    /// The index line is appended before the manifest is rewritten, so a failed
    /// append leaves the trace active and a retry finalizes it again. Finalizing
    /// an already-finalized trace returns the stored manifest and only appends
    /// to the index if its line is missing.
    #[instrument(skip_all, fields(trace_id = %trace_id))]
    pub fn finalize(
        &self,
        trace_id: &str,
        project: &Project,
        kind: InvocationKind,
        ctx: &FinalizeContext,
    ) -> Result<TraceManifest> {
        let paths = self.paths(trace_id);
        let mut manifest = self.load_manifest(trace_id)?;
        if !manifest.is_active() {
            debug!("trace already finalized");
            if !self.index_contains(trace_id)? {
                warn!("finalized trace missing from index; appending");
                self.append_index(&manifest)?;
            }
            return Ok(manifest);
        }
        if manifest.kind != kind {
            warn!(manifest_kind = %manifest.kind, requested = %kind, "kind mismatch on finalize");
        }
        if manifest.project_hash != project.hash() {
            warn!(
                manifest_project = %manifest.project,
                project = %project.root().display(),
                "project mismatch on finalize"
            );
        }

        let evidence = gather_evidence(&paths)?;
        let outcome = derive_outcome(&evidence);
        let duration = duration_secs(&manifest.started_at, ctx.now);
        if duration.is_none() {
            warn!(started_at = %manifest.started_at, "unparseable start time; duration unknown");
        }

        manifest.status = TraceStatus::Finalized;
        manifest.outcome = Some(outcome);
        manifest.ended_at = Some(format_utc(ctx.now));
        manifest.duration_secs = duration;
        manifest.files_changed = ctx.files_changed;
        manifest.proof_status = ctx.proof_status;
        if !self.index_contains(trace_id)? {
            self.append_index(&manifest)?;
        }
        write_manifest(&paths.manifest, &manifest)?;

        let key = MarkerKey::new(manifest.kind, &manifest.session_id, &manifest.project_hash);
        if release_marker(&self.root, &key, trace_id)? {
            debug!("marker released");
        }
        info!(outcome = %outcome, duration_secs = ?duration, "trace finalized");
        Ok(manifest)
    }

    /// Load and schema-validate a manifest.
    pub fn load_manifest(&self, trace_id: &str) -> Result<TraceManifest> {
        let path = self.paths(trace_id).manifest;
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read manifest {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse manifest {}", path.display()))?;
        validate_manifest(&value).with_context(|| format!("validate {}", path.display()))?;
        serde_json::from_value(value)
            .with_context(|| format!("deserialize manifest {}", path.display()))
    }

    /// Every readable manifest in the store, sorted by trace id.
    ///
    /// Invalid manifests are skipped with a warning.
    pub fn list_manifests(&self) -> Result<Vec<TraceManifest>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.root.display()));
            }
        };
        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", self.root.display()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_trace_id(&name) || !entry.path().is_dir() {
                continue;
            }
            match self.load_manifest(&name) {
                Ok(manifest) => manifests.push(manifest),
                Err(err) => warn!(trace_id = %name, err = %format!("{err:#}"), "skipping manifest"),
            }
        }
        manifests.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));
        Ok(manifests)
    }

    /// Find the active trace for an invocation that is finishing.
    ///
    /// Tries the marker, then active traces of this session, then recent
    /// active traces of this project from any session.
    pub fn locate_active(
        &self,
        kind: InvocationKind,
        session_id: &str,
        project_hash: &str,
    ) -> Result<Option<LocatedTrace>> {
        let key = MarkerKey::new(kind, session_id, project_hash);
        if let Some(trace_id) = read_fresh_marker(&self.root, &key, self.stale_after)? {
            match self.load_manifest(&trace_id) {
                Ok(manifest) if manifest.is_active() => {
                    return Ok(Some(LocatedTrace {
                        trace_id,
                        via: LookupPath::Marker,
                    }));
                }
                Ok(_) => debug!(trace_id, "marker points at finalized trace"),
                Err(err) => warn!(trace_id, err = %format!("{err:#}"), "marker points at unreadable trace"),
            }
        }

        let candidates: Vec<TraceManifest> = self
            .list_manifests()?
            .into_iter()
            .filter(|m| m.is_active() && m.kind == kind && m.project_hash == project_hash)
            .collect();

        if let Some(manifest) = candidates.iter().rev().find(|m| m.session_id == session_id) {
            return Ok(Some(LocatedTrace {
                trace_id: manifest.trace_id.clone(),
                via: LookupPath::SessionScan,
            }));
        }

        let now = Utc::now();
        let window = chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::MAX);
        let recent = candidates.iter().rev().find(|m| {
            m.started()
                .is_some_and(|started| now.signed_duration_since(started) <= window)
        });
        Ok(recent.map(|manifest| LocatedTrace {
            trace_id: manifest.trace_id.clone(),
            via: LookupPath::ProjectScan,
        }))
    }

    /// Worker summary, or `None` if absent or blank.
    pub fn read_summary(&self, trace_id: &str) -> Result<Option<String>> {
        let summary = read_optional(&self.paths(trace_id).summary)?;
        Ok(summary.filter(|text| !text.trim().is_empty()))
    }

    /// Whether the index already has a line for `trace_id`.
    pub fn index_contains(&self, trace_id: &str) -> Result<bool> {
        let Some(contents) = read_optional(&self.index_path())? else {
            return Ok(false);
        };
        Ok(contents.lines().any(|line| {
            serde_json::from_str::<Value>(line)
                .ok()
                .is_some_and(|entry| entry["trace_id"] == trace_id)
        }))
    }

    /// Append one manifest as a JSON line to the index.
    pub fn append_index(&self, manifest: &TraceManifest) -> Result<()> {
        let path = self.index_path();
        let line = serde_json::to_string(manifest).context("serialize index entry")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open index {}", path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("append index {}", path.display()))
    }

    /// Copy the index into `backups/` and keep only the newest `keep` copies.
    ///
    /// Returns how many old backups were deleted.
    pub fn rotate_backups(&self, keep: usize) -> Result<usize> {
        let index = self.index_path();
        if !index.exists() {
            return Ok(0);
        }
        let backups = StateKey::IndexBackups.path(&self.root);
        fs::create_dir_all(&backups).with_context(|| format!("create {}", backups.display()))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let mut seq = 0u32;
        let target = loop {
            let candidate = backups.join(format!("index-{stamp}-{seq:03}.jsonl"));
            if !candidate.exists() {
                break candidate;
            }
            seq += 1;
        };
        fs::copy(&index, &target).with_context(|| format!("copy index to {}", target.display()))?;

        let mut existing: Vec<PathBuf> = fs::read_dir(&backups)
            .with_context(|| format!("read {}", backups.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("index-") && n.ends_with(".jsonl"))
            })
            .collect();
        existing.sort();

        let excess = existing.len().saturating_sub(keep);
        for old in &existing[..excess] {
            fs::remove_file(old).with_context(|| format!("remove backup {}", old.display()))?;
        }
        debug!(backup = %target.display(), removed = excess, "index rotated");
        Ok(excess)
    }
}

fn write_manifest(path: &Path, manifest: &TraceManifest) -> Result<()> {
    let value = serde_json::to_value(manifest).context("serialize manifest")?;
    validate_manifest(&value)?;
    let mut buf = serde_json::to_string_pretty(&value)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_manifest(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(MANIFEST_SCHEMA).context("parse manifest schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "manifest schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn gather_evidence(paths: &TracePaths) -> Result<ArtifactEvidence> {
    let summary = read_optional(&paths.summary)?;
    Ok(ArtifactEvidence {
        summary_present: summary.is_some_and(|text| !text.trim().is_empty()),
        test_output: read_optional(&paths.test_output)?,
        status_note: read_optional(&paths.status_note)?,
    })
}
