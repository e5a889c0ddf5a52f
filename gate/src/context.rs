//! Per-event execution context: project, settings and session.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::io::config::{GateConfig, Settings};
use crate::io::project::Project;
use crate::io::trace_store::TraceStore;

/// Fallback session id source when the event carries none.
pub const SESSION_ENV: &str = "WORKGATE_SESSION_ID";

pub const UNKNOWN_SESSION: &str = "unknown";

/// Where a handler runs and with which settings.
#[derive(Debug, Clone)]
pub struct GateContext {
    pub project: Project,
    pub settings: Settings,
    pub session_id: String,
}

impl GateContext {
    /// Discover the project around `cwd` and load its settings.
    pub fn load(
        cwd: &Path,
        session_id: Option<&str>,
        trace_root_override: Option<&Path>,
    ) -> Result<Self> {
        let project = Project::discover(cwd)?;
        let settings = Settings::load(&project, trace_root_override)?;
        Ok(Self {
            project,
            settings,
            session_id: resolve_session_id(session_id),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.settings.config
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project.state_dir()
    }

    pub fn store(&self) -> TraceStore {
        TraceStore::new(
            self.settings.trace_root.clone(),
            self.settings.config.marker_stale_after(),
        )
    }
}

/// Event session id, else `WORKGATE_SESSION_ID`, else `unknown`.
pub fn resolve_session_id(from_event: Option<&str>) -> String {
    from_event
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(SESSION_ENV)
                .ok()
                .filter(|id| !id.trim().is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_SESSION.to_string())
}
