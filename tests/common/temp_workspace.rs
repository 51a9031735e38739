use std::path::PathBuf;

use tempfile::TempDir;

/// Represents a test fixture with files and an optional cursor position.
#[derive(Debug)]
pub struct Fixture {
    /// Files in the fixture, as (relative path, content) pairs.
    pub files: Vec<(PathBuf, String)>,
    /// Position of the `$0` cursor, if present: (path, line, character),
    /// zero-based to match the LSP-facing APIs.
    pub cursor: Option<(PathBuf, u32, u32)>,
}

/// Parses a fixture string of the form:
///
/// ```text
/// //- /a.py
/// def f(): pass
/// //- /b.py
/// from a import f
/// ```
///
/// A `$0` marker anywhere in a file records a cursor position and is
/// removed from the written content.
///
/// ## Panics
/// Panics if the input has content before the first `//- ` header.
pub fn parse_fixture(input: &str) -> Fixture {
    let mut files = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_content = String::new();
    let mut cursor = None;

    for line in input.lines() {
        if let Some(path) = line.strip_prefix("//- ") {
            if let Some(p) = current_path.take() {
                files.push((p, std::mem::take(&mut current_content)));
            }
            current_path = Some(PathBuf::from(path.trim().trim_start_matches('/')));
        } else {
            let mut l = line.to_string();
            if let Some(idx) = l.find("$0") {
                let path = current_path
                    .clone()
                    .expect("fixture content before first //- header");
                let line_no = u32::try_from(current_content.lines().count()).unwrap();
                let col = u32::try_from(l[..idx].chars().count()).unwrap();
                cursor = Some((path, line_no, col));
                l = l.replace("$0", "");
            }
            current_content.push_str(&l);
            current_content.push('\n');
        }
    }
    if let Some(p) = current_path {
        files.push((p, current_content));
    }

    Fixture { files, cursor }
}

/// A fixture written out under a temporary directory.
pub struct TestWorkspace {
    /// Keeps the directory alive for the test's duration.
    pub root: TempDir,
    /// The parsed fixture.
    pub fixture: Fixture,
    /// Canonicalized root path (resolves symlinks like /var -> /private/var
    /// on macOS).
    canonical_root: PathBuf,
}

impl TestWorkspace {
    /// Writes the fixture's files under a fresh temp directory.
    ///
    /// ## Panics
    /// Panics on any filesystem failure.
    pub fn new(input: &str) -> Self {
        let fixture = parse_fixture(input);
        let root = TempDir::new().expect("failed to create temp directory");

        for (path, content) in &fixture.files {
            let abs = root.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }

        let canonical_root = root
            .path()
            .canonicalize()
            .expect("failed to canonicalize root");

        Self {
            root,
            fixture,
            canonical_root,
        }
    }

    /// Returns the canonicalized root path.
    pub fn canonical_root(&self) -> &PathBuf {
        &self.canonical_root
    }

    /// Converts a relative path to an absolute path under the root.
    pub fn apath(&self, path: &str) -> PathBuf {
        self.canonical_root.join(path)
    }
}
