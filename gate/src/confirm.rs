//! Human confirmation: a prompt consisting only of a keyword verifies the work.

use anyhow::Result;
use tracing::{info, instrument};

use crate::context::GateContext;
use crate::core::proof::{GateEvent, Transition};
use crate::hook::HookResponse;
use crate::transition::apply_event;

/// True if the whole prompt is one of `keywords` (case-insensitive, trailing
/// `.`/`!` ignored). Keywords inside longer prompts never count.
pub fn is_confirmation(prompt: &str, keywords: &[String]) -> bool {
    let normalized = prompt
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    !normalized.is_empty()
        && keywords
            .iter()
            .any(|keyword| keyword.trim().to_lowercase() == normalized)
}

#[instrument(skip_all, fields(session_id = %ctx.session_id))]
pub fn on_prompt(ctx: &GateContext, prompt: &str) -> Result<HookResponse> {
    if !is_confirmation(prompt, &ctx.config().confirm_keywords) {
        return Ok(HookResponse::Allow);
    }
    let applied = apply_event(&ctx.state_dir(), GateEvent::HumanConfirmed)?;
    Ok(match applied.transition {
        Transition::Write(status) => {
            info!(from = %applied.before.describe(), "confirmed by operator");
            HookResponse::Advise(format!(
                "workgate: proof-of-work confirmed manually (was '{}'); status is now '{status}'",
                applied.before.describe()
            ))
        }
        _ => HookResponse::Allow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::breadcrumb::write_breadcrumb;
    use crate::test_support::{TestProject, workspace_proof_raw};

    fn keywords() -> Vec<String> {
        vec!["verified".to_string(), "LGTM".to_string()]
    }

    #[test]
    fn only_whole_prompt_keywords_confirm() {
        assert!(is_confirmation("verified", &keywords()));
        assert!(is_confirmation("  LGTM! ", &keywords()));
        assert!(is_confirmation("Verified.", &keywords()));
        assert!(!is_confirmation("is it verified?", &keywords()));
        assert!(!is_confirmation("not verified", &keywords()));
        assert!(!is_confirmation("", &keywords()));
    }

    #[test]
    fn confirmation_promotes_missing_record_everywhere() {
        let tp = TestProject::new();
        let workspace = tp.add_workspace("wt");
        write_breadcrumb(&tp.state_dir(), &workspace).expect("breadcrumb");

        let response = on_prompt(&tp.context("s1"), "approved").expect("confirm");
        assert!(matches!(response, HookResponse::Advise(ref m) if m.contains("was 'missing'")));
        assert!(tp.proof_raw().expect("proof").starts_with("verified|"));
        assert_eq!(workspace_proof_raw(&workspace), tp.proof_raw());
    }

    #[test]
    fn confirming_verified_is_silent() {
        let tp = TestProject::new();
        tp.write_proof("verified|7\n");
        assert_eq!(
            on_prompt(&tp.context("s1"), "lgtm").expect("confirm"),
            HookResponse::Allow
        );
        assert_eq!(tp.proof_raw().as_deref(), Some("verified|7\n"));
    }
}
