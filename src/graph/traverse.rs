//! Depth-limited transitive expansion.
//!
//! Seeds a crawl with a set of entity names (bare, or `path:name`
//! qualified), then repeatedly re-seeds from the source side of each
//! discovered edge, up to the requested depth. The deduplicating edge set
//! provides cycle safety.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::Result;
use crate::lsp::LspClient;
use crate::workspace::open_workspace;

use super::refs::assemble_edges;
use super::symbols::{SymbolFilter, build_symbol_index};
use super::EdgeSet;

/// Expansion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Expand along callers of the discovered edges.
    #[default]
    Downstream,
    /// Reserved; yields no edges today.
    Upstream,
    /// Reserved; yields no edges today.
    Both,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "downstream" => Ok(Direction::Downstream),
            "upstream" => Ok(Direction::Upstream),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Options for [`traverse`].
///
/// The kind filters are accepted for forward compatibility but not
/// enforced; the extractor only produces `invoke` edges today.
#[derive(Debug, Clone, Default)]
pub struct TraverseOptions {
    /// Expansion direction.
    pub direction: Direction,
    /// How many expansion levels to run.
    pub depth: u32,
    /// Advisory filter on entity kinds.
    pub entity_kinds: Vec<String>,
    /// Advisory filter on dependency kinds.
    pub dependency_kinds: Vec<String>,
}

/// Expands the invocation graph from `seeds` to `options.depth` levels.
pub async fn traverse(root: &Path, seeds: &[String], options: &TraverseOptions) -> Result<EdgeSet> {
    let workspace = open_workspace(root).await?;
    let root_path = workspace.root().to_path_buf();

    let mut edges = EdgeSet::new();
    if options.direction == Direction::Downstream {
        let mut current: Vec<String> = seeds.to_vec();
        let mut depth = 1;
        while depth <= options.depth {
            let level = traverse_level(workspace.client(), &root_path, &current).await?;

            let mut todo = Vec::new();
            for edge in level {
                // The source endpoint becomes a next-level seed unless its
                // reference site had no enclosing function.
                let name = edge.source.rsplit(':').next().unwrap_or("");
                if name != "None" {
                    todo.push(edge.source.clone());
                }
                edges.insert(edge);
            }
            todo.sort();
            todo.dedup();
            if todo.is_empty() {
                break;
            }
            current = todo;
            depth += 1;
        }
    }

    workspace.shutdown().await;
    Ok(edges)
}

/// One expansion level: index the symbols matching `seeds`, crawl their
/// references, and assemble edges. Unenclosed reference sites are kept —
/// they terminate expansion rather than being dropped.
async fn traverse_level(client: &LspClient, root: &Path, seeds: &[String]) -> Result<EdgeSet> {
    let filter = seed_filter(seeds);
    let index = build_symbol_index(client, root, &filter).await?;

    let mut results = Vec::new();
    for seed in &index.seeds {
        match client
            .references(&seed.uri, seed.line, seed.character, &seed.qualified, None)
            .await
        {
            Ok(result) => results.push(result),
            Err(e) => debug!("references failed for {}: {e}", seed.name),
        }
    }

    Ok(assemble_edges(client, root, &index, &results, true).await)
}

/// Seeds qualify by bare name, or by `path:name` when any seed carries a
/// colon. Expansion-level seeds arrive as `path:line:name` and reduce to
/// `path:name`.
fn seed_filter(seeds: &[String]) -> SymbolFilter {
    if seeds.is_empty() {
        return SymbolFilter::All;
    }
    if seeds.iter().any(|s| s.contains(':')) {
        let pairs: HashSet<String> = seeds
            .iter()
            .map(|s| {
                let parts: Vec<&str> = s.split(':').collect();
                match parts.len() {
                    3 => format!("{}:{}", parts[0], parts[2]),
                    _ => s.clone(),
                }
            })
            .collect();
        SymbolFilter::Qualified(pairs)
    } else {
        SymbolFilter::Names(seeds.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_str() {
        assert_eq!("downstream".parse::<Direction>(), Ok(Direction::Downstream));
        assert_eq!("upstream".parse::<Direction>(), Ok(Direction::Upstream));
        assert_eq!("both".parse::<Direction>(), Ok(Direction::Both));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_seed_filter_bare_names() {
        let filter = seed_filter(&["f".to_string(), "g".to_string()]);
        assert!(matches!(filter, SymbolFilter::Names(_)));
    }

    #[test]
    fn test_seed_filter_reduces_expansion_seeds() {
        let filter = seed_filter(&["pkg/a.py:12:handler".to_string()]);
        match filter {
            SymbolFilter::Qualified(pairs) => {
                assert!(pairs.contains("pkg/a.py:handler"));
            }
            other => panic!("expected qualified filter, got {other:?}"),
        }
    }

    #[test]
    fn test_seed_filter_empty_matches_all() {
        assert!(matches!(seed_filter(&[]), SymbolFilter::All));
    }
}
