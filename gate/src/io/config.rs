//! Gate configuration stored under `.workgate/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::project::Project;
use crate::io::state_store::write_atomic;

/// Environment override for the trace root.
pub const TRACE_ROOT_ENV: &str = "WORKGATE_TRACE_ROOT";

/// Gate configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// hooks were tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Where traces are stored. Defaults to `$HOME/.workgate/traces`.
    pub trace_root: Option<PathBuf>,

    /// Markers older than this are orphans from crashed invocations.
    pub marker_stale_secs: u64,

    /// Number of rotated trace-index backups to keep.
    pub backup_keep: usize,

    /// File extensions whose writes invalidate proof of work.
    pub source_extensions: Vec<String>,

    /// Whole-prompt keywords that count as human confirmation.
    pub confirm_keywords: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            trace_root: None,
            marker_stale_secs: 2 * 60 * 60,
            backup_keep: 3,
            source_extensions: [
                "rs", "py", "ts", "tsx", "js", "jsx", "go", "java", "kt", "c", "h", "cpp", "hpp",
                "cs", "rb", "swift", "sh", "bash", "zsh", "sql", "lua",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            confirm_keywords: ["verified", "approved", "lgtm"]
                .iter()
                .map(|kw| kw.to_string())
                .collect(),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.marker_stale_secs == 0 {
            return Err(anyhow!("marker_stale_secs must be > 0"));
        }
        if self.backup_keep == 0 {
            return Err(anyhow!("backup_keep must be > 0"));
        }
        if self.source_extensions.iter().any(|ext| ext.trim().is_empty() || ext.starts_with('.')) {
            return Err(anyhow!(
                "source_extensions entries must be non-empty and have no leading '.'"
            ));
        }
        if self.confirm_keywords.iter().any(|kw| kw.trim().is_empty()) {
            return Err(anyhow!("confirm_keywords entries must be non-empty"));
        }
        Ok(())
    }

    pub fn marker_stale_after(&self) -> Duration {
        Duration::from_secs(self.marker_stale_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GateConfig::default()`.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    if !path.exists() {
        let cfg = GateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk.
pub fn write_config(path: &Path, cfg: &GateConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// `$HOME/.workgate/traces`.
pub fn default_trace_root() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join(".workgate").join("traces"))
}

/// Effective settings for one project: its config plus the resolved trace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config: GateConfig,
    pub trace_root: PathBuf,
}

impl Settings {
    /// Resolve settings for `project`.
    ///
    /// Trace root precedence: `override_root`, then `WORKGATE_TRACE_ROOT`, then
    /// the config file, then `$HOME/.workgate/traces`.
    pub fn load(project: &Project, override_root: Option<&Path>) -> Result<Self> {
        let config = load_config(&project.config_path())?;
        let trace_root = match override_root {
            Some(root) => root.to_path_buf(),
            None => match std::env::var_os(TRACE_ROOT_ENV) {
                Some(root) if !root.is_empty() => PathBuf::from(root),
                _ => match &config.trace_root {
                    Some(root) => root.clone(),
                    None => default_trace_root()?,
                },
            },
        };
        Ok(Self { config, trace_root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GateConfig::default());
        assert_eq!(cfg.marker_stale_after(), Duration::from_secs(7200));
        assert_eq!(cfg.backup_keep, 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = GateConfig {
            trace_root: Some(PathBuf::from("/var/traces")),
            ..GateConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "marker_stale_secs = 60\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.marker_stale_secs, 60);
        assert_eq!(cfg.confirm_keywords, GateConfig::default().confirm_keywords);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "backup_keep = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("backup_keep"));

        fs::write(&path, "source_extensions = [\".rs\"]\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn override_root_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::at(temp.path());
        let traces = temp.path().join("traces");
        let settings = Settings::load(&project, Some(&traces)).expect("settings");
        assert_eq!(settings.trace_root, traces);
    }
}
