//! Workspace file enumeration.
//!
//! Recursive traversal under a root, skipping a fixed set of tooling and
//! environment directories and honoring a `.gitignore` at the root if one
//! exists. A missing or unreadable `.gitignore` silently degrades to "no
//! ignore patterns".

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::trace;

use super::lang::Language;

/// Directory names that are never descended into.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".github",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".mypy_cache",
    ".pytest_cache",
    "node_modules",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

/// Whether a directory name is in the skip set.
fn is_skipped_dir(name: &str) -> bool {
    DEFAULT_SKIP_DIRS.contains(&name)
}

/// Enumerates all files under `root`, honoring the skip-directory set and
/// the root `.gitignore`. Results are sorted for determinism.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(|entry| {
            // The root itself always passes, whatever it is named.
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(is_skipped_dir))
        });

    // Only the root .gitignore participates; nested ignore files and the
    // user's global configuration do not.
    let gitignore = root.join(".gitignore");
    if gitignore.is_file() {
        if let Some(e) = builder.add_ignore(&gitignore) {
            trace!("ignoring unusable .gitignore: {e}");
        }
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!("walk error: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.into_path();
        // Defensive: anything that escaped the root is dropped.
        if !path.starts_with(root) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    files
}

/// Enumerates the files belonging to `language` under `root`.
pub fn list_source_files(root: &Path, language: Language) -> Vec<PathBuf> {
    list_files(root)
        .into_iter()
        .filter(|path| language.matches_path(path))
        .collect()
}
