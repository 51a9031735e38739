//! Type definitions and helpers for LSP operations.
//!
//! Language servers answer `documentSymbol` in one of two shapes depending
//! on declared capabilities: flat `SymbolInformation` records (with a
//! `location` and optional `containerName`) or hierarchical
//! `DocumentSymbol` trees (with `range` and `children`). [`SymbolRecord`]
//! decodes either; everything downstream goes through its accessors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lsp_types::{Location, Range, SymbolKind, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::error::LspError;

use super::LspResult;

/// Converts a filesystem path to a canonical `file://` URI.
///
/// The path is resolved (symlinks and relative components) before
/// conversion, so every URI the client tracks is derived from one
/// canonical absolute path. A path that no longer exists (a deleted file
/// reported by the watcher) resolves through its parent directory so the
/// URI still matches the one used when it was opened.
///
/// ## Errors
/// Returns [`LspError::InvalidArgument`] if the path cannot be resolved or
/// converted.
pub fn path_to_uri(path: &Path) -> LspResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| LspError::InvalidArgument(format!("failed to get current directory: {e}")))?
            .join(path)
    };

    let canonical = match absolute.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) => {
            let resolved_parent = absolute.parent().and_then(|p| p.canonicalize().ok());
            match (resolved_parent, absolute.file_name()) {
                (Some(parent), Some(name)) => parent.join(name),
                _ => absolute,
            }
        }
    };

    Url::from_file_path(&canonical)
        .map_err(|()| LspError::InvalidArgument(format!("invalid path: {}", canonical.display())))
}

/// Converts a `file://` URI back to a filesystem path.
pub fn uri_to_path(uri: &Url) -> Option<PathBuf> {
    uri.to_file_path().ok()
}

/// Returns the path of `uri` relative to `root`, as a forward-slash string.
///
/// Returns `None` for non-file URIs and for paths outside the root.
pub fn uri_relpath(uri: &Url, root: &Path) -> Option<String> {
    let path = uri.to_file_path().ok()?;
    let rel = path.strip_prefix(root).ok()?;
    let s = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(s)
}

/// One symbol from a `documentSymbol` response, in either wire shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    /// The symbol's bare name.
    pub name: String,
    /// The LSP symbol kind code.
    pub kind: SymbolKind,
    /// Qualifying container (class or namespace), flat shape only.
    #[serde(default)]
    pub container_name: Option<String>,
    /// Location, present in the flat `SymbolInformation` shape.
    #[serde(default)]
    location: Option<Location>,
    /// Full range, present in the hierarchical `DocumentSymbol` shape.
    #[serde(default)]
    range: Option<Range>,
    /// Nested symbols, hierarchical shape only.
    #[serde(default)]
    pub children: Vec<SymbolRecord>,
}

impl SymbolRecord {
    /// The symbol's source range, whichever shape carried it.
    pub fn range(&self) -> Option<Range> {
        self.location
            .as_ref()
            .map(|loc| loc.range)
            .or(self.range)
    }

    /// The symbol's document URI (flat shape only; hierarchical responses
    /// are implicitly scoped to the requested document).
    pub fn uri(&self) -> Option<&Url> {
        self.location.as_ref().map(|loc| &loc.uri)
    }

    /// `container.name` when a container qualifies the symbol, else `name`.
    pub fn qualified_name(&self) -> String {
        match &self.container_name {
            Some(container) => format!("{container}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Decodes a `documentSymbol` result. `null` decodes to the empty list.
    ///
    /// ## Errors
    /// Returns [`LspError::Parse`] when the value is neither null nor a
    /// symbol array.
    pub fn parse_list(result: Value) -> LspResult<Vec<SymbolRecord>> {
        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result)
            .map_err(|e| LspError::Parse(format!("documentSymbol result: {e}")))
    }
}

/// Result of a `textDocument/references` request.
///
/// Echoes the request parameters so fan-out callers can correlate results
/// with the work items that produced them, and carries the request's wall
/// time for progress metrics.
#[derive(Debug, Clone)]
pub struct ReferencesResult {
    /// The document the request was issued against.
    pub uri: Url,
    /// Zero-based cursor line.
    pub line: u32,
    /// Zero-based cursor column.
    pub character: u32,
    /// The symbol name the caller associated with the cursor.
    pub name: String,
    /// Reference locations returned by the server.
    pub locations: Vec<Location>,
    /// Wall-clock duration of the round trip.
    pub duration: Duration,
}

impl ReferencesResult {
    /// The `(uri, line, character)` key identifying this unit of work.
    pub fn key(&self) -> (Url, u32, u32) {
        (self.uri.clone(), self.line, self.character)
    }
}

/// The raw integer code of a symbol kind.
pub fn symbol_kind_code(kind: SymbolKind) -> u32 {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32
}

/// Converts an LSP symbol kind to a human-readable string.
pub fn symbol_kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum_member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type_parameter",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_symbol_information() {
        let result = json!([{
            "name": "helper",
            "kind": 12,
            "location": {
                "uri": "file:///tmp/a.py",
                "range": {
                    "start": {"line": 3, "character": 0},
                    "end": {"line": 5, "character": 8}
                }
            },
            "containerName": "Tools"
        }]);

        let symbols = SymbolRecord::parse_list(result).unwrap();
        assert_eq!(symbols.len(), 1);
        let sym = &symbols[0];
        assert_eq!(sym.name, "helper");
        assert_eq!(sym.kind, SymbolKind::FUNCTION);
        assert_eq!(sym.qualified_name(), "Tools.helper");
        assert_eq!(sym.range().unwrap().start.line, 3);
        assert_eq!(sym.uri().unwrap().as_str(), "file:///tmp/a.py");
    }

    #[test]
    fn test_parse_hierarchical_document_symbol() {
        let result = json!([{
            "name": "C",
            "kind": 5,
            "range": {
                "start": {"line": 0, "character": 0},
                "end": {"line": 4, "character": 0}
            },
            "selectionRange": {
                "start": {"line": 0, "character": 6},
                "end": {"line": 0, "character": 7}
            },
            "children": [{
                "name": "m",
                "kind": 6,
                "range": {
                    "start": {"line": 1, "character": 4},
                    "end": {"line": 2, "character": 12}
                },
                "selectionRange": {
                    "start": {"line": 1, "character": 8},
                    "end": {"line": 1, "character": 9}
                }
            }]
        }]);

        let symbols = SymbolRecord::parse_list(result).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].kind, SymbolKind::CLASS);
        assert_eq!(symbols[0].children.len(), 1);
        assert_eq!(symbols[0].children[0].name, "m");
        assert!(symbols[0].uri().is_none());
    }

    #[test]
    fn test_parse_null_result_is_empty() {
        assert!(SymbolRecord::parse_list(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(SymbolRecord::parse_list(json!("nope")).is_err());
    }

    #[test]
    fn test_path_to_uri() {
        let temp_dir = std::env::temp_dir();
        let temp_file = temp_dir.join("lspgraph_uri_test.py");
        std::fs::write(&temp_file, "# test file").expect("failed to create temp file");

        let uri = path_to_uri(&temp_file).unwrap();
        assert!(uri.as_str().starts_with("file://"));
        assert!(uri.as_str().contains("lspgraph_uri_test.py"));

        let _ = std::fs::remove_file(&temp_file);
    }

    #[test]
    fn test_uri_relpath() {
        let uri = Url::parse("file:///work/project/src/app.py").unwrap();
        assert_eq!(
            uri_relpath(&uri, Path::new("/work/project")),
            Some("src/app.py".to_string())
        );
        assert_eq!(uri_relpath(&uri, Path::new("/elsewhere")), None);
    }

    #[test]
    fn test_symbol_kind_name() {
        assert_eq!(symbol_kind_name(SymbolKind::FUNCTION), "function");
        assert_eq!(symbol_kind_name(SymbolKind::CLASS), "class");
        assert_eq!(symbol_kind_name(SymbolKind::METHOD), "method");
    }
}
