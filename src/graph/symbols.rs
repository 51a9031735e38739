//! Symbol enumeration and cursor resolution.
//!
//! The crawl needs, for every function, method, and class defined under
//! the root, a cursor position that sits on the defined identifier —
//! `references` returns nothing useful when the cursor lands on a `def`
//! or `class` keyword, a decorator, or indentation. [`build_symbol_index`]
//! fans out `documentSymbol` over all open documents and distills the
//! qualifying definitions into request-ready seeds.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lsp_types::SymbolKind;
use tracing::{info, trace};

use crate::error::{Error, Result};
use crate::lsp::types::symbol_kind_code;
use crate::lsp::{LspClient, SymbolRecord, Url, uri_to_path};
use crate::schedule::{StreamOptions, stream_requests};

/// Kinds that seed reference requests.
const SEED_KINDS: [SymbolKind; 3] = [SymbolKind::CLASS, SymbolKind::METHOD, SymbolKind::FUNCTION];

/// Kinds that are skipped outright.
const IGNORED_KINDS: [SymbolKind; 8] = [
    SymbolKind::VARIABLE,
    SymbolKind::CONSTANT,
    SymbolKind::FIELD,
    SymbolKind::ENUM,
    SymbolKind::STRING,
    SymbolKind::CONSTRUCTOR,
    SymbolKind::NAMESPACE,
    SymbolKind::PROPERTY,
];

/// How many `documentSymbol` requests run concurrently.
const SYMBOL_CONCURRENCY: usize = 20;

/// Restricts which symbols an index includes.
#[derive(Debug, Clone, Default)]
pub enum SymbolFilter {
    /// Keep every qualifying symbol.
    #[default]
    All,
    /// Keep symbols with one of these bare names.
    Names(HashSet<String>),
    /// Keep symbols matching `relative_path:name` pairs.
    Qualified(HashSet<String>),
}

impl SymbolFilter {
    /// A filter for a single entity name.
    pub fn entity(name: impl Into<String>) -> Self {
        SymbolFilter::Names(HashSet::from([name.into()]))
    }

    fn matches(&self, name: &str, relpath: &str) -> bool {
        match self {
            SymbolFilter::All => true,
            SymbolFilter::Names(names) => names.contains(name),
            SymbolFilter::Qualified(pairs) => pairs.contains(&format!("{relpath}:{name}")),
        }
    }
}

/// One reference request waiting to be issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Document containing the definition.
    pub uri: Url,
    /// Zero-based line of the definition.
    pub line: u32,
    /// Resolved cursor column on the identifier.
    pub character: u32,
    /// The symbol's bare name; cursor resolution works on this.
    pub name: String,
    /// The container-qualified name; edge endpoints carry this.
    pub qualified: String,
}

impl Seed {
    /// The work-item key used to mark completion across crawl restarts.
    pub fn key(&self) -> (Url, u32, u32) {
        (self.uri.clone(), self.line, self.character)
    }
}

/// Snapshot of every document's symbols plus the distilled seeds.
pub struct SymbolIndex {
    /// Per-document symbol lists, as returned by the server.
    pub symbols: HashMap<Url, Vec<SymbolRecord>>,
    /// Request-ready definitions.
    pub seeds: Vec<Seed>,
    /// `(uri, start line) → bare name` for fast enclosing-function hits.
    line_names: HashMap<(Url, u32), String>,
}

impl SymbolIndex {
    /// Looks up the symbol defined at `(uri, line)`, if the seed pass saw
    /// one there.
    pub fn line_name(&self, uri: &Url, line: u32) -> Option<&str> {
        self.line_names
            .get(&(uri.clone(), line))
            .map(String::as_str)
    }
}

/// Fans out `documentSymbol` over every open document and distills seeds.
///
/// ## Errors
/// [`Error::UnexpectedSymbolKind`] when the server reports a kind outside
/// the recognized sets where a function/method/class was expected.
pub async fn build_symbol_index(
    client: &LspClient,
    root: &Path,
    filter: &SymbolFilter,
) -> Result<SymbolIndex> {
    let uris = client.open_files().await;
    let options = StreamOptions {
        max_concurrency: SYMBOL_CONCURRENCY,
        show_progress: false,
        ..Default::default()
    };
    let results = stream_requests(uris.clone(), &options, |uri: Url| async move {
        client.document_symbol(&uri).await
    })
    .await;

    let mut symbols: HashMap<Url, Vec<SymbolRecord>> = HashMap::new();
    for (uri, result) in uris.iter().zip(results) {
        symbols.insert(uri.clone(), result.unwrap_or_default());
    }

    let mut seeds = Vec::new();
    let mut line_names = HashMap::new();
    for uri in &uris {
        let doc_symbols = &symbols[uri];
        if doc_symbols.is_empty() {
            continue;
        }
        let relpath = crate::lsp::uri_relpath(uri, root).unwrap_or_default();
        let content = client.read_file(uri).await;

        for sym in doc_symbols {
            if !filter.matches(&sym.name, &relpath) {
                continue;
            }
            if IGNORED_KINDS.contains(&sym.kind) {
                continue;
            }
            if !SEED_KINDS.contains(&sym.kind) {
                return Err(Error::UnexpectedSymbolKind {
                    kind: symbol_kind_code(sym.kind),
                    name: sym.name.clone(),
                });
            }
            if sym.name == "__init__" && sym.container_name.is_some() {
                continue;
            }
            if sym.name == "main" {
                continue;
            }
            if sym.name == "(anonymous struct)" {
                continue;
            }
            let Some(range) = sym.range() else { continue };

            // Symbols reported outside the workspace root (headers pulled
            // in by clangd, vendored trees) do not seed.
            let sym_uri = sym.uri().unwrap_or(uri);
            let in_root = uri_to_path(sym_uri).is_some_and(|p| p.starts_with(root));
            if !in_root {
                continue;
            }

            trace!("{} - {}", symbol_kind_code(sym.kind), sym.qualified_name());

            let Some(character) =
                resolve_cursor_column(&content, range.start.line, range.end.line, &sym.name)
            else {
                continue;
            };

            let seed = Seed {
                uri: sym_uri.clone(),
                line: range.start.line,
                character,
                name: sym.name.clone(),
                qualified: sym.qualified_name(),
            };
            line_names.insert((seed.uri.clone(), seed.line), seed.name.clone());
            seeds.push(seed);
        }
    }

    info!(
        "processed {} files, got {} uniq symbols",
        symbols.len(),
        seeds.len()
    );

    Ok(SymbolIndex {
        symbols,
        seeds,
        line_names,
    })
}

/// Resolves the cursor column for a definition.
///
/// Reads the symbol's lines from the document, skips leading lines that
/// start (after indent) with `#` or `@`, and locates the bare name — a
/// `__builtin___` prefix is stripped first — as a substring of the first
/// remaining line. Returns `None` when the name does not appear there;
/// such symbols yield no references.
pub fn resolve_cursor_column(
    content: &str,
    start_line: u32,
    end_line: u32,
    name: &str,
) -> Option<u32> {
    let lines: Vec<&str> = content.split('\n').collect();
    let start = start_line as usize;
    if start >= lines.len() {
        return None;
    }
    let end = (end_line as usize).min(lines.len() - 1);

    let mut idx = start;
    while idx <= end {
        let trimmed = lines[idx].trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with('@') {
            idx += 1;
        } else {
            break;
        }
    }
    if idx > end {
        return None;
    }

    let bare = name.strip_prefix("__builtin___").unwrap_or(name);
    let line = lines[idx];
    let byte_col = line.find(bare)?;
    // LSP columns count characters, not bytes.
    let col = line[..byte_col].chars().count();
    Some(col as u32)
}
