//! Test-only helpers: temporary projects, file aging and report builders.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::context::GateContext;
use crate::io::config::{GateConfig, Settings};
use crate::io::project::Project;
use crate::io::trace_store::TraceStore;

/// A throwaway primary workspace with its own trace root.
///
/// Layout under one temp dir: `main/` (with a `.git` directory and
/// `.workgate/`), `traces/`, and any secondary workspaces added later.
pub struct TestProject {
    _temp: TempDir,
    pub project: Project,
    trace_root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().canonicalize().expect("canonicalize tempdir");
        let root = base.join("main");
        fs::create_dir_all(root.join(".git")).expect("create .git");
        fs::create_dir_all(root.join(".workgate")).expect("create .workgate");
        let trace_root = base.join("traces");
        Self {
            project: Project::at(&root),
            trace_root,
            _temp: temp,
        }
    }

    pub fn root(&self) -> &Path {
        self.project.root()
    }

    pub fn trace_root(&self) -> &Path {
        &self.trace_root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project.state_dir()
    }

    pub fn settings(&self) -> Settings {
        Settings {
            config: GateConfig::default(),
            trace_root: self.trace_root.clone(),
        }
    }

    pub fn context(&self, session_id: &str) -> GateContext {
        GateContext {
            project: self.project.clone(),
            settings: self.settings(),
            session_id: session_id.to_string(),
        }
    }

    pub fn store(&self) -> TraceStore {
        TraceStore::new(
            self.trace_root.clone(),
            GateConfig::default().marker_stale_after(),
        )
    }

    /// Write the project-local proof record verbatim.
    pub fn write_proof(&self, raw: &str) {
        fs::write(self.project.proof_path(), raw).expect("write proof");
    }

    /// Project-local proof record, if present.
    pub fn proof_raw(&self) -> Option<String> {
        fs::read_to_string(self.project.proof_path()).ok()
    }

    /// Create a secondary workspace (`.git` file plus `.workgate/`) next to `main/`.
    pub fn add_workspace(&self, name: &str) -> PathBuf {
        let base = self.root().parent().expect("project parent");
        let workspace = base.join(name);
        fs::create_dir_all(workspace.join(".workgate")).expect("create workspace state");
        fs::write(
            workspace.join(".git"),
            format!("gitdir: {}/.git/worktrees/{name}\n", self.root().display()),
        )
        .expect("write .git file");
        workspace
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a workspace's proof record, if present.
pub fn workspace_proof_raw(workspace: &Path) -> Option<String> {
    fs::read_to_string(workspace.join(".workgate").join("proof-status")).ok()
}

/// Push a file's mtime `age` into the past.
pub fn age_file(path: &Path, age: Duration) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .expect("open file to age");
    file.set_modified(SystemTime::now() - age)
        .expect("set mtime");
}

/// Completion report with an assessment section containing `assessment`.
pub fn report_with_assessment(assessment: &str, signal: bool) -> String {
    let mut report = format!(
        "## Summary\nExercised the change end to end.\n\n## Test cases\n- retries are partially applied on timeout\n\n## Assessment\n{assessment}\n"
    );
    if signal {
        report.push_str("\nAUTOVERIFY: CLEAN\n");
    }
    report
}

/// A report the classifier accepts.
pub fn clean_report() -> String {
    report_with_assessment("**High confidence**\nAll 37 tests pass.", true)
}
