//! Deterministic classification of written paths.

use std::path::{Component, Path};

/// Directories whose contents never count as source.
const IGNORED_DIRS: [&str; 5] = [".git", ".workgate", "node_modules", "target", ".venv"];

/// True if writing `path` should invalidate proof of work.
///
/// - Any component inside an ignored directory: not source.
/// - Otherwise the extension must be in `extensions` (case-insensitive).
pub fn is_source_path(path: &Path, extensions: &[String]) -> bool {
    let in_ignored_dir = path.components().any(|component| match component {
        Component::Normal(name) => IGNORED_DIRS.iter().any(|dir| name == *dir),
        _ => false,
    });
    if in_ignored_dir {
        return false;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
