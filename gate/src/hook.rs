//! Host lifecycle hook contract.
//!
//! One JSON event arrives on stdin; at most one JSON line goes to stdout.
//! Malformed input and handler failures never crash the host: they are logged
//! and degrade to the most conservative answer (deny for the commit/merge
//! check, silence everywhere else).

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::confirm::on_prompt;
use crate::context::GateContext;
use crate::core::command::parse_integration_command;
use crate::core::types::InvocationKind;
use crate::dispatch::on_dispatch;
use crate::enforce::{after_command, check_command};
use crate::invalidate::on_source_write;
use crate::lifecycle::open_trace;
use crate::observe::on_stop;
use crate::session_end::on_session_end;

/// Raw lifecycle event as sent by the host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEvent {
    pub hook_event_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Value,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
}

impl HookEvent {
    fn input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.get(key).and_then(Value::as_str)
    }

    fn kind(&self) -> Option<InvocationKind> {
        self.agent_type.as_deref().and_then(InvocationKind::from_agent_type)
    }
}

/// Lifecycle events the gate reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SubagentStart,
    SubagentStop,
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    SessionEnd,
}

impl LifecycleEvent {
    pub fn parse(name: &str) -> Option<Self> {
        let event = match name {
            "SubagentStart" => LifecycleEvent::SubagentStart,
            "SubagentStop" => LifecycleEvent::SubagentStop,
            "PreToolUse" => LifecycleEvent::PreToolUse,
            "PostToolUse" => LifecycleEvent::PostToolUse,
            "UserPromptSubmit" => LifecycleEvent::UserPromptSubmit,
            "SessionEnd" => LifecycleEvent::SessionEnd,
            _ => return None,
        };
        Some(event)
    }
}

/// What the hook tells the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResponse {
    /// Silent allow; nothing is printed.
    Allow,
    /// Allow, with a message surfaced to the operator.
    Advise(String),
    /// Block the tool call.
    Deny(String),
}

impl HookResponse {
    /// The single stdout line, or `None` for a silent allow.
    pub fn to_line(&self) -> Option<String> {
        match self {
            HookResponse::Allow => None,
            HookResponse::Advise(message) => Some(json!({ "message": message }).to_string()),
            HookResponse::Deny(reason) => {
                Some(json!({ "decision": "deny", "reason": reason }).to_string())
            }
        }
    }
}

/// Process-level inputs that are not part of the event.
#[derive(Debug, Clone, Default)]
pub struct HookEnv {
    pub trace_root_override: Option<PathBuf>,
    /// Used when the event carries no `cwd`.
    pub fallback_cwd: Option<PathBuf>,
}

impl HookEnv {
    pub fn from_process(trace_root_override: Option<PathBuf>) -> Self {
        Self {
            trace_root_override,
            fallback_cwd: std::env::current_dir().ok(),
        }
    }
}

/// Handle one raw stdin payload. Never fails.
pub fn handle_hook_input(raw: &str, env: &HookEnv) -> HookResponse {
    let event: HookEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(err) => {
            debug!(err = %err, "malformed hook input; ignoring");
            return HookResponse::Allow;
        }
    };
    handle_event(&event, env)
}

/// Route a parsed event. Never fails.
pub fn handle_event(event: &HookEvent, env: &HookEnv) -> HookResponse {
    let Some(lifecycle) = LifecycleEvent::parse(&event.hook_event_name) else {
        debug!(event = %event.hook_event_name, "unhandled hook event");
        return HookResponse::Allow;
    };
    let Some(cwd) = event.cwd.clone().or_else(|| env.fallback_cwd.clone()) else {
        warn!("hook event without cwd");
        return conservative(lifecycle, event, "working directory unknown");
    };
    match route(lifecycle, event, &cwd, env) {
        Ok(response) => response,
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(event = %event.hook_event_name, err = %detail, "hook handler failed");
            conservative(lifecycle, event, &detail)
        }
    }
}

/// Deny integrating commands whose gate state could not be read; stay silent otherwise.
fn conservative(lifecycle: LifecycleEvent, event: &HookEvent, detail: &str) -> HookResponse {
    if lifecycle == LifecycleEvent::PreToolUse && is_shell_tool(event) {
        let command = event.input_str("command").unwrap_or_default();
        if let Some(cmd) = parse_integration_command(command) {
            return HookResponse::Deny(format!(
                "git {} blocked: proof-of-work state could not be checked ({detail})",
                cmd.intent.as_str()
            ));
        }
    }
    HookResponse::Allow
}

#[instrument(skip_all, fields(event = ?lifecycle, tool = ?event.tool_name))]
fn route(
    lifecycle: LifecycleEvent,
    event: &HookEvent,
    cwd: &Path,
    env: &HookEnv,
) -> Result<HookResponse> {
    let context = || {
        GateContext::load(
            cwd,
            event.session_id.as_deref(),
            env.trace_root_override.as_deref(),
        )
    };
    match lifecycle {
        LifecycleEvent::SubagentStart => {
            let Some(kind) = event.kind() else {
                return Ok(HookResponse::Allow);
            };
            let ctx = context()?;
            Ok(match open_trace(&ctx, kind) {
                Some(trace_id) => HookResponse::Advise(format!(
                    "workgate trace {trace_id}: write your final report to {}",
                    ctx.store().paths(&trace_id).summary.display()
                )),
                None => HookResponse::Allow,
            })
        }
        LifecycleEvent::SubagentStop => {
            let Some(kind) = event.kind() else {
                return Ok(HookResponse::Allow);
            };
            on_stop(&context()?, kind)
        }
        LifecycleEvent::PreToolUse if is_shell_tool(event) => {
            let command = event.input_str("command").unwrap_or_default();
            check_command(cwd, command)
        }
        LifecycleEvent::PreToolUse if is_dispatch_tool(event) => {
            let dispatched = event
                .input_str("subagent_type")
                .and_then(InvocationKind::from_agent_type);
            if dispatched.is_some_and(InvocationKind::is_implementation) {
                on_dispatch(&context()?, &event.tool_input)?;
            }
            Ok(HookResponse::Allow)
        }
        LifecycleEvent::PostToolUse if is_shell_tool(event) => {
            let command = event.input_str("command").unwrap_or_default();
            after_command(cwd, command, tool_succeeded(&event.tool_response))
        }
        LifecycleEvent::PostToolUse if is_write_tool(event) => {
            let Some(path) = event
                .input_str("file_path")
                .or_else(|| event.input_str("notebook_path"))
            else {
                return Ok(HookResponse::Allow);
            };
            on_source_write(&context()?, cwd, Path::new(path))?;
            Ok(HookResponse::Allow)
        }
        LifecycleEvent::PreToolUse | LifecycleEvent::PostToolUse => Ok(HookResponse::Allow),
        LifecycleEvent::UserPromptSubmit => {
            let prompt = event.prompt.as_deref().unwrap_or_default();
            on_prompt(&context()?, prompt)
        }
        LifecycleEvent::SessionEnd => {
            on_session_end(&context()?)?;
            Ok(HookResponse::Allow)
        }
    }
}

fn tool_name(event: &HookEvent) -> &str {
    event.tool_name.as_deref().unwrap_or_default()
}

fn is_shell_tool(event: &HookEvent) -> bool {
    tool_name(event) == "Bash"
}

fn is_dispatch_tool(event: &HookEvent) -> bool {
    matches!(tool_name(event), "Task" | "Agent")
}

fn is_write_tool(event: &HookEvent) -> bool {
    matches!(tool_name(event), "Write" | "Edit" | "MultiEdit" | "NotebookEdit")
}

/// A shell result counts as failed when it reports a nonzero exit code, an
/// interruption or an error flag. Absent fields count as success.
pub fn tool_succeeded(response: &Value) -> bool {
    let exit_code = response
        .get("exit_code")
        .or_else(|| response.get("exitCode"))
        .and_then(Value::as_i64);
    if exit_code.is_some_and(|code| code != 0) {
        return false;
    }
    let flag = |key: &str| response.get(key).and_then(Value::as_bool);
    if flag("interrupted") == Some(true) || flag("is_error") == Some(true) {
        return false;
    }
    flag("success") != Some(false)
}
