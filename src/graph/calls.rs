//! Definition-based call-graph extraction.
//!
//! The inverse of the reference crawl: instead of asking "who references
//! this definition", scan each function body for call-shaped identifiers
//! and ask the server where each one is defined. The `(\w+)\s*\(` scan is
//! deliberately lossy — it matches inside comments and strings — and the
//! subsequent `definition` lookup discards names that do not resolve.
//! Faster than the reference crawl, coarser edges (bare names, `called`
//! relation).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use lsp_types::SymbolKind;
use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::lsp::{LspClient, Url};
use crate::schedule::{StreamOptions, batch_requests, stream_requests};
use crate::workspace::open_workspace;

use super::{Edge, EdgeSet, Relation, extract_code};

/// Concurrency for the `definition` fan-out.
const DEFINITION_CONCURRENCY: usize = 10;

fn call_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\w+)\s*\(").expect("call pattern"))
}

/// Opens the workspace at `root` and extracts `caller called callee`
/// edges from every function body.
pub async fn harvest_calls(root: &Path) -> Result<EdgeSet> {
    let workspace = open_workspace(root).await?;
    let call_graph = analyze_project(workspace.client()).await?;
    workspace.shutdown().await;

    let mut edges = EdgeSet::new();
    for (caller, callees) in call_graph {
        for callee in callees {
            edges.insert(Edge::new(caller.clone(), Relation::Called, callee));
        }
    }
    Ok(edges)
}

/// Builds the caller → callee-names map for all open documents.
async fn analyze_project(client: &LspClient) -> Result<HashMap<String, Vec<String>>> {
    let uris = client.open_files().await;
    let results = stream_requests(uris.clone(), &StreamOptions::default(), |uri: Url| async move {
        client.document_symbol(&uri).await
    })
    .await;

    // One definition request per distinct position; many call sites share
    // the same first-occurrence key.
    let mut unique_positions: HashSet<(Url, u32, u32)> = HashSet::new();
    let mut call_sites: Vec<((Url, u32, u32), String, String)> = Vec::new();

    for (uri, result) in uris.iter().zip(results) {
        let symbols = result.unwrap_or_default();
        let text = client.read_file(uri).await;

        for sym in &symbols {
            if sym.kind != SymbolKind::FUNCTION && sym.kind != SymbolKind::METHOD {
                continue;
            }
            let Some(range) = sym.range() else { continue };
            let body = extract_code(&text, range.start.line, range.end.line);
            for name in called_names(&body) {
                let Some((line, character)) = position_for_name(&body, &name, range.start.line)
                else {
                    continue;
                };
                let key = (uri.clone(), line, character);
                unique_positions.insert(key.clone());
                call_sites.push((key, name, sym.name.clone()));
            }
        }
    }

    debug!(
        "call sites: {} ({} distinct positions)",
        call_sites.len(),
        unique_positions.len()
    );

    let positions: Vec<(Url, u32, u32)> = unique_positions.into_iter().collect();
    let locations = batch_requests(
        positions.clone(),
        DEFINITION_CONCURRENCY,
        |(uri, line, character)| async move { client.definition(&uri, line, character).await },
    )
    .await;

    let resolved: HashMap<(Url, u32, u32), bool> = positions
        .into_iter()
        .zip(locations)
        .map(|(key, locs)| (key, locs.is_some_and(|l| !l.is_empty())))
        .collect();

    let mut call_graph: HashMap<String, Vec<String>> = HashMap::new();
    for (key, name, caller) in call_sites {
        if resolved.get(&key).copied().unwrap_or(false) {
            call_graph.entry(caller).or_default().push(name);
        }
    }
    Ok(call_graph)
}

/// Names that appear in call position inside a function body. The first
/// match is the function's own definition line and is skipped.
fn called_names(body: &str) -> Vec<String> {
    call_pattern()
        .captures_iter(body)
        .skip(1)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// First occurrence of `name` inside the body, as a document position.
fn position_for_name(body: &str, name: &str, start_line: u32) -> Option<(u32, u32)> {
    for (offset, line) in body.lines().enumerate() {
        if let Some(byte_col) = line.find(name) {
            let col = line[..byte_col].chars().count();
            return Some((start_line + offset as u32, col as u32));
        }
    }
    None
}
