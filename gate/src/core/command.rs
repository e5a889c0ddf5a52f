//! Recognition of integrating git operations inside shell command lines.

use std::path::{Path, PathBuf};

/// Git operation that integrates work and therefore needs proof of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitIntent {
    Commit,
    Merge,
}

impl GitIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            GitIntent::Commit => "commit",
            GitIntent::Merge => "merge",
        }
    }
}

/// An integrating git invocation found in a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationCommand {
    pub intent: GitIntent,
    /// Directory the command targets (`cd X &&` and `git -C X`), if any.
    /// Relative paths are left relative; the caller joins them with its cwd.
    pub target_dir: Option<PathBuf>,
}

/// Find the first `git commit` / `git merge` in `command`.
///
/// The command is split into segments on shell separators outside quotes and
/// each segment is tokenized with shell quoting rules. Leading `VAR=value`
/// assignments and wrappers such as `env`, `sudo` or `nohup` are skipped, and
/// `sh -c <script>` is searched recursively. `cd <dir>` segments update the
/// working directory for later segments. `git merge --abort` is not
/// integrating and is ignored.
///
/// A segment that cannot be tokenized but still mentions git together with
/// `commit` or `merge` is reported with no target directory, so it is checked
/// against the gate of the current project.
pub fn parse_integration_command(command: &str) -> Option<IntegrationCommand> {
    let mut cwd: Option<PathBuf> = None;
    for segment in split_segments(command) {
        let Some(tokens) = shlex::split(&segment) else {
            if let Some(found) = mentioned_intent(&segment) {
                return Some(found);
            }
            continue;
        };
        let tokens = strip_prefixes(&tokens);
        let Some(program) = tokens.first() else {
            continue;
        };
        if program == "cd" {
            if let Some(dir) = tokens.get(1) {
                cwd = Some(join_dir(cwd.as_deref(), Path::new(dir)));
            }
            continue;
        }
        if is_shell_program(program) {
            if let Some(found) = shell_script(&tokens[1..]).and_then(parse_integration_command) {
                return Some(IntegrationCommand {
                    target_dir: match (cwd.as_deref(), found.target_dir) {
                        (Some(base), Some(dir)) => Some(join_dir(Some(base), &dir)),
                        (base, dir) => dir.or_else(|| base.map(Path::to_path_buf)),
                    },
                    intent: found.intent,
                });
            }
            continue;
        }
        if !is_git_program(program) {
            continue;
        }
        if let Some(found) = parse_git_args(&tokens[1..], cwd.as_deref()) {
            return Some(found);
        }
    }
    None
}

fn parse_git_args(args: &[String], cwd: Option<&Path>) -> Option<IntegrationCommand> {
    let mut target = cwd.map(Path::to_path_buf);
    let mut idx = 0;
    while idx < args.len() {
        let arg = args[idx].as_str();
        match arg {
            "-C" => {
                let dir = args.get(idx + 1)?;
                target = Some(join_dir(target.as_deref(), Path::new(dir)));
                idx += 2;
            }
            "-c" | "--git-dir" | "--work-tree" | "--namespace" => idx += 2,
            _ if arg.starts_with('-') => idx += 1,
            "commit" => {
                return Some(IntegrationCommand {
                    intent: GitIntent::Commit,
                    target_dir: target,
                });
            }
            "merge" => {
                if args[idx + 1..].iter().any(|a| a == "--abort" || a == "--quit") {
                    return None;
                }
                return Some(IntegrationCommand {
                    intent: GitIntent::Merge,
                    target_dir: target,
                });
            }
            _ => return None,
        }
    }
    None
}

/// Drop `VAR=value` assignments and command wrappers in front of the program.
fn strip_prefixes(tokens: &[String]) -> &[String] {
    let mut rest = tokens;
    loop {
        let Some(first) = rest.first() else {
            return rest;
        };
        if is_assignment(first) {
            rest = &rest[1..];
            continue;
        }
        let wrapper = first.rsplit('/').next().unwrap_or(first.as_str());
        let takes_value: &[&str] = match wrapper {
            "env" => &["-u", "--unset", "-C", "--chdir", "-S", "--split-string"],
            "sudo" => &["-u", "--user", "-g", "--group", "-h", "--host", "-C", "-D", "-p", "-U"],
            "nice" => &["-n", "--adjustment"],
            "command" | "time" | "nohup" | "exec" | "builtin" | "doas" => &[],
            _ => return rest,
        };
        rest = &rest[1..];
        while let Some(opt) = rest.first() {
            if opt == "--" {
                rest = &rest[1..];
                break;
            }
            if !opt.starts_with('-') {
                break;
            }
            let skip = if takes_value.contains(&opt.as_str()) { 2 } else { 1 };
            rest = &rest[skip.min(rest.len())..];
        }
    }
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            let mut chars = name.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn is_shell_program(program: &str) -> bool {
    matches!(
        program.rsplit('/').next().unwrap_or(program),
        "sh" | "bash" | "zsh" | "dash" | "ksh"
    )
}

/// Script passed to a shell via `-c` (also in combined flags like `-lc`).
fn shell_script(args: &[String]) -> Option<&str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with('-') && !arg.starts_with("--") && arg.contains('c') {
            return iter.next().map(String::as_str);
        }
        if !arg.starts_with('-') {
            return None;
        }
    }
    None
}

/// Best-effort intent for a segment whose quoting could not be parsed.
fn mentioned_intent(segment: &str) -> Option<IntegrationCommand> {
    let words: Vec<&str> = segment
        .split(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '(' || c == '`')
        .filter(|w| !w.is_empty())
        .collect();
    let git_at = words.iter().position(|w| is_git_program(w))?;
    let intent = words[git_at + 1..].iter().find_map(|w| match *w {
        "commit" => Some(GitIntent::Commit),
        "merge" => Some(GitIntent::Merge),
        _ => None,
    })?;
    Some(IntegrationCommand {
        intent,
        target_dir: None,
    })
}

/// Split on `;`, newlines, `&`, `|` and their doubled forms, outside quotes.
fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();
    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), _) if ch == q => {
                quote = None;
                current.push(ch);
            }
            (Some('"'), '\\') => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), _) => current.push(ch),
            (None, '"' | '\'') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '\\') => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, ';' | '\n') => segments.push(std::mem::take(&mut current)),
            (None, '&' | '|') => {
                if chars.peek() == Some(&ch) {
                    chars.next();
                }
                segments.push(std::mem::take(&mut current));
            }
            (None, _) => current.push(ch),
        }
    }
    segments.push(current);
    segments
        .into_iter()
        .map(|s| s.trim().trim_start_matches('(').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_git_program(program: &str) -> bool {
    program == "git" || program.ends_with("/git")
}

fn join_dir(base: Option<&Path>, dir: &Path) -> PathBuf {
    match base {
        Some(base) if dir.is_relative() => base.join(dir),
        _ => dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cmd: &str) -> Option<IntegrationCommand> {
        parse_integration_command(cmd)
    }

    #[test]
    fn plain_commit_and_merge() {
        assert_eq!(
            parse("git commit -m 'feat: add parser'"),
            Some(IntegrationCommand {
                intent: GitIntent::Commit,
                target_dir: None
            })
        );
        assert_eq!(
            parse("git merge --no-ff feature/x").map(|c| c.intent),
            Some(GitIntent::Merge)
        );
    }

    #[test]
    fn non_integrating_commands_are_ignored() {
        assert_eq!(parse("git status"), None);
        assert_eq!(parse("git log --oneline | grep commit"), None);
        assert_eq!(parse("echo git commit"), None);
        assert_eq!(parse("git merge --abort"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn dash_c_sets_target_dir() {
        let found = parse("git -C /work/wt-1 commit -am fix").expect("commit");
        assert_eq!(found.target_dir, Some(PathBuf::from("/work/wt-1")));
    }

    #[test]
    fn cd_prefix_sets_target_dir() {
        let found = parse("cd /work/repo && git add -A && git commit -m x").expect("commit");
        assert_eq!(found.intent, GitIntent::Commit);
        assert_eq!(found.target_dir, Some(PathBuf::from("/work/repo")));
    }

    #[test]
    fn relative_dash_c_joins_cd_dir() {
        let found = parse("cd /work; git -C sub merge main").expect("merge");
        assert_eq!(found.target_dir, Some(PathBuf::from("/work/sub")));
    }

    #[test]
    fn global_options_are_skipped() {
        let found = parse("git -c user.name=bot --no-pager commit --amend").expect("commit");
        assert_eq!(found.intent, GitIntent::Commit);
        assert_eq!(found.target_dir, None);
    }

    #[test]
    fn absolute_git_binary_is_recognized() {
        assert!(parse("/usr/bin/git commit -m x").is_some());
    }

    #[test]
    fn assignments_and_wrappers_are_skipped() {
        for cmd in [
            "env GIT_EDITOR=true git commit -m x",
            "GIT_AUTHOR_NAME=bot git commit -m x",
            "sudo git commit -m x",
            "sudo -u deploy git commit -m x",
            "command git commit -m x",
            "time git commit -m x",
            "nohup git merge feature",
            "env -i PATH=/usr/bin /usr/bin/git commit -m x",
        ] {
            assert!(parse(cmd).is_some(), "{cmd}");
        }
    }

    #[test]
    fn quoted_dash_c_path_with_spaces() {
        let found = parse(r#"git -C "/tmp/my repo" commit -m x"#).expect("commit");
        assert_eq!(found.target_dir, Some(PathBuf::from("/tmp/my repo")));
        let found = parse("cd '/tmp/my repo' && git commit -m x").expect("commit");
        assert_eq!(found.target_dir, Some(PathBuf::from("/tmp/my repo")));
    }

    #[test]
    fn separators_inside_quotes_do_not_split() {
        let found = parse(r#"git commit -m "fix: a; b && c""#).expect("commit");
        assert_eq!(found.intent, GitIntent::Commit);
        assert_eq!(parse(r#"echo "x; git commit""#), None);
    }

    #[test]
    fn shell_dash_c_script_is_searched() {
        let found = parse(r#"bash -lc "cd /work/wt && git commit -m x""#).expect("commit");
        assert_eq!(found.target_dir, Some(PathBuf::from("/work/wt")));
    }

    #[test]
    fn unparseable_quoting_still_gates() {
        let found = parse(r#"git commit -m "unterminated"#).expect("commit");
        assert_eq!(found.intent, GitIntent::Commit);
        assert_eq!(found.target_dir, None);
    }
}
