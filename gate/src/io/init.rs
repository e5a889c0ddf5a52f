//! Scaffolding for a project's `.workgate/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{GateConfig, write_config};
use crate::io::project::Project;
use crate::io::state_store::{StateKey, write_atomic};

const STATE_GITIGNORE: &str = "# Gate state is per-checkout and must not be committed.\n*\n";

/// Options for [`init_project`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite an existing config and `.gitignore`.
    pub force: bool,
}

/// Create `.workgate/` with a `.gitignore` and default config.
///
/// An existing state directory is left alone unless `options.force` is set;
/// the proof record and breadcrumb are never touched.
pub fn init_project(project: &Project, options: &InitOptions) -> Result<PathBuf> {
    let state_dir = project.state_dir();
    if state_dir.exists() && !state_dir.is_dir() {
        return Err(anyhow!(
            "workgate init: {} exists but is not a directory",
            state_dir.display()
        ));
    }
    let config_path = project.config_path();
    if config_path.exists() && !options.force {
        return Err(anyhow!(
            "workgate init: {} already exists (use --force to overwrite)",
            config_path.display()
        ));
    }
    fs::create_dir_all(&state_dir).with_context(|| format!("create {}", state_dir.display()))?;
    write_if_missing_or_force(
        &StateKey::GitIgnore.path(&state_dir),
        STATE_GITIGNORE,
        options.force,
    )?;
    write_config(&config_path, &GateConfig::default())?;
    Ok(state_dir)
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    write_atomic(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_gitignore_and_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::at(temp.path());
        let state_dir = init_project(&project, &InitOptions::default()).expect("init");
        assert!(state_dir.join(".gitignore").is_file());
        assert_eq!(
            load_config(&project.config_path()).expect("load"),
            GateConfig::default()
        );
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::at(temp.path());
        init_project(&project, &InitOptions::default()).expect("init");
        fs::write(project.config_path(), "backup_keep = 9\n").expect("edit");
        fs::write(project.proof_path(), "pending|1\n").expect("proof");

        let err = init_project(&project, &InitOptions::default()).expect_err("exists");
        assert!(err.to_string().contains("--force"));

        init_project(&project, &InitOptions { force: true }).expect("force");
        assert_eq!(load_config(&project.config_path()).expect("load").backup_keep, 3);
        assert_eq!(
            fs::read_to_string(project.proof_path()).expect("proof"),
            "pending|1\n"
        );
    }
}
