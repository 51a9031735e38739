//! Invocation-graph extraction.
//!
//! The modules here mine a bootstrapped workspace for an inter-procedural
//! edge set:
//!
//! - `symbols`: fans out `documentSymbol` and selects the definitions that
//!   seed reference requests, including cursor-column resolution
//! - `refs`: the reference crawl with restart-on-stall and edge assembly
//! - `calls`: the faster, lossier `definition`-based variant
//! - `traverse`: depth-limited transitive expansion from seed entities

pub mod calls;
pub mod refs;
pub mod symbols;
pub mod traverse;

use std::collections::BTreeSet;

use crate::lsp::SymbolRecord;
use lsp_types::SymbolKind;

pub use calls::harvest_calls;
pub use refs::{HarvestOptions, ReferenceHarvester};
pub use symbols::{Seed, SymbolFilter, SymbolIndex, build_symbol_index, resolve_cursor_column};
pub use traverse::{Direction, TraverseOptions, traverse};

/// The relationship an edge records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relation {
    /// Reference-site → definition, from the references-based crawl.
    Invoke,
    /// Caller → callee name, from the definition-based variant.
    Called,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Relation::Invoke => "invoke",
            Relation::Called => "called",
        })
    }
}

/// One directed edge of the invocation graph.
///
/// Endpoints are `relative_path:line:name` strings for the references
/// crawl (lines 1-based) and bare names for the `called` variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    /// The referencing side.
    pub source: String,
    /// The relationship label.
    pub relation: Relation,
    /// The referenced side.
    pub target: String,
}

impl Edge {
    /// Builds an edge.
    pub fn new(source: impl Into<String>, relation: Relation, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            relation,
            target: target.into(),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}", self.source, self.relation, self.target)
    }
}

/// A deduplicated, deterministically ordered edge set.
pub type EdgeSet = BTreeSet<Edge>;

/// Relative-path fragments whose reference sites are excluded from the
/// graph: test and documentation trees, package markers, CLI front-ends.
pub const FILTERED_PATH_PATTERNS: &[&str] = &["test", "docs", "__init__.py", "cli.py"];

/// Whether a relative path matches the exclusion patterns.
pub fn is_filtered_path(relpath: &str) -> bool {
    FILTERED_PATH_PATTERNS
        .iter()
        .any(|pattern| relpath.contains(pattern))
}

/// Finds the innermost function, method, or class whose range spans
/// `line`, walking nested symbols recursively.
pub fn find_enclosing_function(symbols: &[SymbolRecord], line: u32) -> Option<String> {
    let mut result = None;
    for symbol in symbols {
        let spans_scope = symbol.kind == SymbolKind::CLASS
            || symbol.kind == SymbolKind::METHOD
            || symbol.kind == SymbolKind::FUNCTION;
        if spans_scope
            && let Some(range) = symbol.range()
            && range.start.line <= line
            && line <= range.end.line
        {
            result = Some(symbol.name.clone());
        }
        if !symbol.children.is_empty()
            && let Some(nested) = find_enclosing_function(&symbol.children, line)
        {
            result = Some(nested);
        }
    }
    result
}

/// Joins the lines `start_line..=end_line` of `text` (0-based, inclusive,
/// clamped to the document).
pub fn extract_code(text: &str, start_line: u32, end_line: u32) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = start_line as usize;
    if start >= lines.len() {
        return String::new();
    }
    let end = (end_line as usize).min(lines.len() - 1);
    lines[start..=end].join("\n")
}

/// Extracts a symbol's source text from its document content.
///
/// Without `strip`, whole lines are returned. With `strip`, the range's
/// character bounds are applied to the first and last lines only.
pub fn extract_symbol_code(symbol: &SymbolRecord, content: &str, strip: bool) -> String {
    let Some(range) = symbol.range() else {
        return String::new();
    };
    let (start_line, start_char) = (range.start.line as usize, range.start.character as usize);
    let (end_line, end_char) = (range.end.line as usize, range.end.character as usize);

    let lines: Vec<&str> = content.lines().collect();
    if start_line >= lines.len() || end_line >= lines.len() {
        return String::new();
    }

    if start_line == end_line {
        let line = lines[start_line];
        return if strip {
            slice_chars(line, start_char, end_char).to_string()
        } else {
            line.to_string()
        };
    }

    let mut code: Vec<String> = lines[start_line..=end_line]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    if strip {
        code[0] = skip_chars(&code[0], start_char).to_string();
        let last = code.len() - 1;
        code[last] = take_chars(&code[last], end_char).to_string();
    }
    code.join("\n")
}

/// `s[start..end]` in characters, tolerant of out-of-range bounds.
fn slice_chars(s: &str, start: usize, end: usize) -> &str {
    let byte_start = s
        .char_indices()
        .nth(start)
        .map_or(s.len(), |(i, _)| i);
    let byte_end = s.char_indices().nth(end).map_or(s.len(), |(i, _)| i);
    if byte_start >= byte_end {
        ""
    } else {
        &s[byte_start..byte_end]
    }
}

/// `s[start..]` in characters.
fn skip_chars(s: &str, start: usize) -> &str {
    s.char_indices().nth(start).map_or("", |(i, _)| &s[i..])
}

/// `s[..end]` in characters.
fn take_chars(s: &str, end: usize) -> &str {
    s.char_indices().nth(end).map_or(s, |(i, _)| &s[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn symbols_from(value: serde_json::Value) -> Vec<SymbolRecord> {
        SymbolRecord::parse_list(value).unwrap()
    }

    fn flat_symbol(name: &str, kind: u32, start: u32, end: u32) -> serde_json::Value {
        json!({
            "name": name,
            "kind": kind,
            "location": {
                "uri": "file:///ws/a.py",
                "range": {
                    "start": {"line": start, "character": 0},
                    "end": {"line": end, "character": 0}
                }
            }
        })
    }

    #[test]
    fn test_edge_line_format() {
        let edge = Edge::new("b.py:2:g", Relation::Invoke, "a.py:1:f");
        assert_eq!(edge.to_string(), "b.py:2:g\tinvoke\ta.py:1:f");
        let edge = Edge::new("g", Relation::Called, "f");
        assert_eq!(edge.to_string(), "g\tcalled\tf");
    }

    #[test]
    fn test_edge_set_deduplicates() {
        let mut edges = EdgeSet::new();
        assert!(edges.insert(Edge::new("a", Relation::Invoke, "b")));
        assert!(!edges.insert(Edge::new("a", Relation::Invoke, "b")));
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_path_filters() {
        assert!(is_filtered_path("tests/unit/test_app.py"));
        assert!(is_filtered_path("pkg/test_helpers.py"));
        assert!(is_filtered_path("docs/examples/usage.py"));
        assert!(is_filtered_path("pkg/__init__.py"));
        assert!(is_filtered_path("app/cli.py"));
        assert!(!is_filtered_path("app/core.py"));
    }

    #[test]
    fn test_find_enclosing_function_innermost_wins() {
        let symbols = symbols_from(json!([
            {
                "name": "Outer",
                "kind": 5,
                "range": {"start": {"line": 0, "character": 0}, "end": {"line": 10, "character": 0}},
                "selectionRange": {"start": {"line": 0, "character": 6}, "end": {"line": 0, "character": 11}},
                "children": [{
                    "name": "method",
                    "kind": 6,
                    "range": {"start": {"line": 2, "character": 4}, "end": {"line": 5, "character": 0}},
                    "selectionRange": {"start": {"line": 2, "character": 8}, "end": {"line": 2, "character": 14}}
                }]
            }
        ]));

        assert_eq!(find_enclosing_function(&symbols, 3), Some("method".to_string()));
        assert_eq!(find_enclosing_function(&symbols, 8), Some("Outer".to_string()));
        assert_eq!(find_enclosing_function(&symbols, 20), None);
    }

    #[test]
    fn test_find_enclosing_function_ignores_variables() {
        let symbols = symbols_from(json!([flat_symbol("CONSTANT", 14, 0, 0)]));
        assert_eq!(find_enclosing_function(&symbols, 0), None);
    }

    #[test]
    fn test_extract_code_clamps_range() {
        let text = "line0\nline1\nline2";
        assert_eq!(extract_code(text, 1, 2), "line1\nline2");
        assert_eq!(extract_code(text, 1, 99), "line1\nline2");
        assert_eq!(extract_code(text, 99, 100), "");
    }

    #[test]
    fn test_extract_symbol_code_single_line() {
        let content = "def f(): pass\nf()\n";
        let symbols = symbols_from(json!([{
            "name": "f",
            "kind": 12,
            "location": {
                "uri": "file:///ws/a.py",
                "range": {
                    "start": {"line": 0, "character": 4},
                    "end": {"line": 0, "character": 5}
                }
            }
        }]));

        // Without strip the whole line comes back; with strip, just the
        // in-line substring.
        assert_eq!(extract_symbol_code(&symbols[0], content, false), "def f(): pass");
        assert_eq!(extract_symbol_code(&symbols[0], content, true), "f");
    }

    #[test]
    fn test_extract_symbol_code_multi_line_strip() {
        let content = "xxdef f():\n    pass\n    return 1yy\n";
        let symbols = symbols_from(json!([{
            "name": "f",
            "kind": 12,
            "location": {
                "uri": "file:///ws/a.py",
                "range": {
                    "start": {"line": 0, "character": 2},
                    "end": {"line": 2, "character": 12}
                }
            }
        }]));

        // Strip applies to first and last lines only.
        assert_eq!(
            extract_symbol_code(&symbols[0], content, true),
            "def f():\n    pass\n    return 1"
        );
        assert_eq!(
            extract_symbol_code(&symbols[0], content, false),
            "xxdef f():\n    pass\n    return 1yy"
        );
    }

    #[test]
    fn test_extract_symbol_code_out_of_range() {
        let symbols = symbols_from(json!([flat_symbol("f", 12, 5, 9)]));
        assert_eq!(extract_symbol_code(&symbols[0], "one line\n", false), "");
    }
}
