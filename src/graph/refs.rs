//! Reference crawl and edge assembly.
//!
//! Some servers — clangd over large C trees in particular — intermittently
//! stall on `references` requests past any reasonable deadline. The crawl
//! therefore treats the server as unreliable: requests run with an
//! aggressive per-request timeout for C, and any transport or protocol
//! error aborts the pass, respawns the client, re-enumerates the symbols,
//! and continues with the work that is not yet done. Document state is
//! re-established from disk on every restart, so the loop is idempotent.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::lsp::{LspClient, ReferencesResult, SymbolRecord, Url, uri_relpath};
use crate::workspace::{Language, open_workspace};

use super::symbols::{Seed, SymbolFilter, SymbolIndex, build_symbol_index};
use super::{Edge, EdgeSet, Relation, find_enclosing_function, is_filtered_path};

/// Aggressive per-request deadline for clangd over C; failing fast beats
/// waiting out a stall.
const C_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Requests slower than this are logged individually; a cluster of them
/// usually precedes a stall.
const SLOW_REQUEST: Duration = Duration::from_secs(1);

/// Options for the reference crawl.
#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    /// Restrict the crawl to one entity name.
    pub entity: Option<String>,
    /// Keep edges whose reference site has no enclosing function; the
    /// source endpoint becomes the literal `None`.
    pub keep_unenclosed: bool,
}

/// The references-based invocation-graph extractor.
pub struct ReferenceHarvester {
    root: PathBuf,
    options: HarvestOptions,
}

impl ReferenceHarvester {
    /// Creates a harvester for a workspace root.
    pub fn new(root: impl Into<PathBuf>, options: HarvestOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Runs the crawl and returns the deduplicated edge set.
    pub async fn harvest(&self) -> Result<EdgeSet> {
        let filter = match &self.options.entity {
            Some(name) => SymbolFilter::entity(name.clone()),
            None => SymbolFilter::All,
        };

        let mut workspace = open_workspace(&self.root).await?;
        let root = workspace.root().to_path_buf();
        let per_request_timeout = request_timeout(workspace.language());
        let mut index = build_symbol_index(workspace.client(), &root, &filter).await?;

        let mut done: HashSet<(Url, u32, u32)> = HashSet::new();
        let mut results: Vec<ReferencesResult> = Vec::new();
        let mut pending: Vec<Seed> = index.seeds.clone();
        let mut request_time = Duration::ZERO;

        while !pending.is_empty() {
            for seed in &pending {
                match workspace
                    .client()
                    .references(
                        &seed.uri,
                        seed.line,
                        seed.character,
                        &seed.qualified,
                        per_request_timeout,
                    )
                    .await
                {
                    Ok(result) => {
                        if result.duration >= SLOW_REQUEST {
                            warn!(
                                "references for {} took {:.1}s",
                                seed.qualified,
                                result.duration.as_secs_f64()
                            );
                        }
                        request_time += result.duration;
                        done.insert(seed.key());
                        results.push(result);
                    }
                    Err(e) => {
                        error!("{e}");
                        // The server is wedged; start over with a fresh
                        // client and re-enumerated symbols.
                        workspace.shutdown().await;
                        workspace = open_workspace(&self.root).await?;
                        index = build_symbol_index(workspace.client(), &root, &filter).await?;
                        break;
                    }
                }
            }
            pending.retain(|seed| !done.contains(&seed.key()));
            let average = request_time
                .checked_div(done.len() as u32)
                .unwrap_or(Duration::ZERO);
            info!(
                "references pending: {} (avg request {:.0}ms)",
                pending.len(),
                average.as_secs_f64() * 1000.0
            );
        }

        let edges = assemble_edges(
            workspace.client(),
            &root,
            &index,
            &results,
            self.options.keep_unenclosed,
        )
        .await;

        workspace.shutdown().await;
        info!("collected {} invocation edges", edges.len());
        Ok(edges)
    }
}

fn request_timeout(language: Language) -> Option<Duration> {
    match language {
        Language::C => Some(C_REQUEST_TIMEOUT),
        _ => None,
    }
}

/// Builds the edge set from completed reference results.
///
/// The enclosing function at each reference site resolves through the
/// index's line cache first; a miss falls back to the cached document
/// symbols, then to one fresh `documentSymbol` request.
pub(crate) async fn assemble_edges(
    client: &LspClient,
    root: &Path,
    index: &SymbolIndex,
    results: &[ReferencesResult],
    keep_unenclosed: bool,
) -> EdgeSet {
    let mut edges = EdgeSet::new();
    let mut fetched: HashMap<Url, Vec<SymbolRecord>> = HashMap::new();

    for result in results {
        if result.locations.is_empty() {
            continue;
        }
        let Some(def_rel) = uri_relpath(&result.uri, root) else {
            continue;
        };

        for reference in &result.locations {
            let ref_uri = &reference.uri;
            let ref_line = reference.range.start.line;
            let Some(ref_rel) = uri_relpath(ref_uri, root) else {
                continue;
            };
            if is_filtered_path(&ref_rel) {
                continue;
            }

            let enclosing = match index.line_name(ref_uri, ref_line) {
                Some(name) => Some(name.to_string()),
                None => {
                    let symbols =
                        document_symbols_with_retry(client, index, &mut fetched, ref_uri).await;
                    find_enclosing_function(symbols, ref_line)
                }
            };

            // References with no enclosing function are imports or
            // top-level direct uses.
            let source_name = match enclosing {
                Some(name) => name,
                None if keep_unenclosed => "None".to_string(),
                None => continue,
            };

            let edge = Edge::new(
                format!("{ref_rel}:{}:{source_name}", ref_line + 1),
                Relation::Invoke,
                format!("{def_rel}:{}:{}", result.line + 1, result.name),
            );
            if edges.insert(edge) && edges.len() % 100 == 0 {
                info!("processed {} references", edges.len());
            }
        }
    }

    edges
}

/// Symbols for a URI: index cache, then the local fetch cache, then one
/// fresh request. Failures leave the entry empty.
async fn document_symbols_with_retry<'a>(
    client: &LspClient,
    index: &'a SymbolIndex,
    fetched: &'a mut HashMap<Url, Vec<SymbolRecord>>,
    uri: &Url,
) -> &'a [SymbolRecord] {
    if let Some(symbols) = index.symbols.get(uri)
        && !symbols.is_empty()
    {
        return symbols;
    }
    if !fetched.contains_key(uri) {
        debug!("symbols for {uri} not in cache, re-requesting");
        let symbols = match client.document_symbol(uri).await {
            Ok(symbols) => symbols,
            Err(e) => {
                debug!("documentSymbol retry failed for {uri}: {e}");
                Vec::new()
            }
        };
        fetched.insert(uri.clone(), symbols);
    }
    &fetched[uri]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timeout_is_aggressive_for_c_only() {
        assert_eq!(request_timeout(Language::C), Some(C_REQUEST_TIMEOUT));
        assert_eq!(request_timeout(Language::Python), None);
        assert_eq!(request_timeout(Language::Cpp), None);
    }
}
