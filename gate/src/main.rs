//! Proof-of-work gate CLI.
//!
//! `workgate hook` is the host integration point: it reads one lifecycle event
//! from stdin and prints at most one response line. The remaining commands are
//! for operators: scaffolding, manual trace control, gate inspection and
//! overrides, report classification and the state-registry lint.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use workgate::context::GateContext;
use workgate::core::classifier::classify_report;
use workgate::core::proof::ProofRecord;
use workgate::core::types::{InvocationKind, ProofStatus};
use workgate::exit_codes;
use workgate::hook::{HookEnv, handle_hook_input};
use workgate::io::init::{InitOptions, init_project};
use workgate::io::project::Project;
use workgate::io::resolver::read_resolved;
use workgate::io::state_store::{StateScope, audit_state_dir};
use workgate::io::sync::replicate_record;
use workgate::io::trace_store::is_trace_id;
use workgate::lifecycle::finalize_context;
use workgate::logging;
use workgate::transition::unix_now;

#[derive(Parser)]
#[command(
    name = "workgate",
    version,
    about = "Proof-of-work gate and trace lifecycle for staged agent workflows"
)]
struct Cli {
    /// Trace root (overrides WORKGATE_TRACE_ROOT and the project config).
    #[arg(long, global = true)]
    trace_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one host lifecycle event from stdin. Always exits 0.
    Hook,
    /// Create `.workgate/` with a `.gitignore` and default config.
    Init {
        /// Overwrite existing config.
        #[arg(short, long)]
        force: bool,
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Open or finalize a trace by hand.
    Trace {
        #[command(subcommand)]
        action: TraceAction,
    },
    /// Inspect or override the proof-of-work record.
    Proof {
        #[command(subcommand)]
        action: ProofAction,
    },
    /// Run the auto-verify classifier on a report file.
    Classify { file: PathBuf },
    /// Report files in the state directories that the registry does not know.
    LintState {
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TraceAction {
    /// Open a trace and print its id.
    Open {
        #[arg(long)]
        kind: InvocationKind,
        #[arg(long)]
        project: Option<PathBuf>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Finalize a trace and print its manifest.
    Finalize {
        #[arg(long)]
        trace_id: String,
        #[arg(long)]
        kind: InvocationKind,
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ProofAction {
    /// Print the resolved proof file and its status. Exits 2 unless verified.
    Status {
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Write a status to every candidate proof file.
    Set {
        status: ProofStatus,
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let trace_root = cli.trace_root.as_deref();
    match cli.command {
        Command::Hook => Ok(cmd_hook(cli.trace_root.clone())),
        Command::Init { force, project } => cmd_init(project.as_deref(), force),
        Command::Trace { action } => match action {
            TraceAction::Open {
                kind,
                project,
                session,
            } => cmd_trace_open(project.as_deref(), kind, session.as_deref(), trace_root),
            TraceAction::Finalize {
                trace_id,
                kind,
                project,
            } => cmd_trace_finalize(project.as_deref(), &trace_id, kind, trace_root),
        },
        Command::Proof { action } => match action {
            ProofAction::Status { project } => cmd_proof_status(project.as_deref()),
            ProofAction::Set { status, project } => cmd_proof_set(project.as_deref(), status),
        },
        Command::Classify { file } => cmd_classify(&file),
        Command::LintState { project } => cmd_lint_state(project.as_deref(), trace_root),
    }
}

fn cmd_hook(trace_root: Option<PathBuf>) -> i32 {
    let mut raw = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut raw) {
        tracing::warn!(err = %err, "failed to read hook input");
        return exit_codes::OK;
    }
    let response = handle_hook_input(&raw, &HookEnv::from_process(trace_root));
    if let Some(line) = response.to_line() {
        println!("{line}");
    }
    exit_codes::OK
}

fn cmd_init(project: Option<&Path>, force: bool) -> Result<i32> {
    let project = discover(project)?;
    let state_dir = init_project(&project, &InitOptions { force })?;
    println!("{}", state_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_trace_open(
    project: Option<&Path>,
    kind: InvocationKind,
    session: Option<&str>,
    trace_root: Option<&Path>,
) -> Result<i32> {
    let ctx = context(project, session, trace_root)?;
    let trace_id = ctx.store().open(&ctx.project, kind, &ctx.session_id)?;
    println!("{trace_id}");
    Ok(exit_codes::OK)
}

fn cmd_trace_finalize(
    project: Option<&Path>,
    trace_id: &str,
    kind: InvocationKind,
    trace_root: Option<&Path>,
) -> Result<i32> {
    let ctx = context(project, None, trace_root)?;
    let manifest = ctx
        .store()
        .finalize(trace_id, &ctx.project, kind, &finalize_context(&ctx))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&manifest).context("serialize manifest")?
    );
    Ok(exit_codes::OK)
}

fn cmd_proof_status(project: Option<&Path>) -> Result<i32> {
    let project = discover(project)?;
    let (path, read) = read_resolved(&project.state_dir());
    println!("{}\t{}", read.describe(), path.display());
    Ok(if read.is_verified() {
        exit_codes::OK
    } else {
        exit_codes::NOT_VERIFIED
    })
}

fn cmd_proof_set(project: Option<&Path>, status: ProofStatus) -> Result<i32> {
    let project = discover(project)?;
    let record = ProofRecord::new(status, unix_now());
    for path in replicate_record(&project.state_dir(), &record)? {
        println!("{}", path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_classify(file: &Path) -> Result<i32> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("read report {}", file.display()))?;
    let classification = classify_report(&text);
    if classification.is_accepted() {
        println!("auto-verify accepted ({})", classification.scope);
        Ok(exit_codes::OK)
    } else {
        println!("{}", classification.explain());
        Ok(exit_codes::REJECTED)
    }
}

fn cmd_lint_state(project: Option<&Path>, trace_root: Option<&Path>) -> Result<i32> {
    let ctx = context(project, None, trace_root)?;
    let mut findings = Vec::new();
    let state_dir = ctx.state_dir();
    for name in audit_state_dir(&state_dir, StateScope::Project, |_| false)? {
        findings.push(state_dir.join(name));
    }
    let root = &ctx.settings.trace_root;
    for name in audit_state_dir(root, StateScope::TraceRoot, is_trace_id)? {
        findings.push(root.join(name));
    }
    for path in &findings {
        println!("unregistered state: {}", path.display());
    }
    Ok(if findings.is_empty() {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn discover(project: Option<&Path>) -> Result<Project> {
    match project {
        Some(dir) => Project::discover(dir),
        None => Project::discover(&std::env::current_dir().context("current directory")?),
    }
}

fn context(
    project: Option<&Path>,
    session: Option<&str>,
    trace_root: Option<&Path>,
) -> Result<GateContext> {
    let dir = match project {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("current directory")?,
    };
    GateContext::load(&dir, session, trace_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hook() {
        let cli = Cli::parse_from(["workgate", "hook"]);
        assert!(matches!(cli.command, Command::Hook));
        assert_eq!(cli.trace_root, None);
    }

    #[test]
    fn parse_trace_open_with_global_root() {
        let cli = Cli::parse_from([
            "workgate",
            "trace",
            "open",
            "--kind",
            "tester",
            "--trace-root",
            "/tmp/traces",
        ]);
        assert_eq!(cli.trace_root, Some(PathBuf::from("/tmp/traces")));
        assert!(matches!(
            cli.command,
            Command::Trace {
                action: TraceAction::Open {
                    kind: InvocationKind::Tester,
                    ..
                }
            }
        ));
    }

    #[test]
    fn parse_proof_set_status() {
        let cli = Cli::parse_from(["workgate", "proof", "set", "needs-verification"]);
        assert!(matches!(
            cli.command,
            Command::Proof {
                action: ProofAction::Set {
                    status: ProofStatus::NeedsVerification,
                    project: None
                }
            }
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["workgate", "trace", "open", "--kind", "reviewer"]).is_err());
    }
}
