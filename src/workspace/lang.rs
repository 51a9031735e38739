//! Language detection and the language-server command table.

use std::collections::HashMap;
use std::path::Path;

use crate::lsp::ServerCommand;

use super::walk;

/// A language the extractor can drive a server for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Python, served by pyright.
    Python,
    /// TypeScript (including TSX), served by typescript-language-server.
    TypeScript,
    /// C, served by clangd with in-memory PCH storage.
    C,
    /// C++, served by clangd.
    Cpp,
}

impl Language {
    /// All supported languages, in tie-breaking order for detection.
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::TypeScript,
        Language::C,
        Language::Cpp,
    ];

    /// The command that spawns this language's server.
    pub fn server_command(self) -> ServerCommand {
        match self {
            Language::Python => ServerCommand::new("pyright-langserver", &["--stdio"]),
            Language::TypeScript => {
                ServerCommand::new("typescript-language-server", &["--stdio"])
            }
            Language::C => ServerCommand::new("clangd", &["--pch-storage=memory"]),
            Language::Cpp => ServerCommand::new("clangd", &[]),
        }
    }

    /// The `languageId` sent in `didOpen`.
    pub fn language_id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// File extensions belonging to this language.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts", "tsx"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "hpp"],
        }
    }

    /// Maps a file extension to its language.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::TypeScript),
            "c" | "h" => Some(Language::C),
            "cpp" | "hpp" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Whether a path carries one of this language's extensions.
    pub fn matches_path(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions().contains(&ext))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.language_id())
    }
}

/// Scans the file-type distribution under `root` and returns the detected
/// languages, dominant first. Empty when nothing recognizable is found.
pub fn detect_languages(root: &Path) -> Vec<Language> {
    let mut counts: HashMap<Language, usize> = HashMap::new();
    for path in walk::list_files(root) {
        if let Some(lang) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
        {
            *counts.entry(lang).or_insert(0) += 1;
        }
    }

    let mut detected: Vec<(Language, usize)> = counts.into_iter().collect();
    // Dominant first; ties broken by the declaration order in ALL so the
    // result is deterministic.
    detected.sort_by_key(|(lang, count)| {
        let tie = Language::ALL.iter().position(|l| l == lang).unwrap_or(usize::MAX);
        (std::cmp::Reverse(*count), tie)
    });
    detected.into_iter().map(|(lang, _)| lang).collect()
}
