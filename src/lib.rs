//! lspgraph
//!
//! A multi-language call-graph and cross-reference extractor built on top
//! of external language servers. Given a source tree, it spawns the
//! appropriate server (pyright for Python, typescript-language-server for
//! TypeScript, clangd for C and C++), drives it through the full LSP
//! lifecycle, and mines it for document symbols, references, and
//! definitions to produce an inter-procedural invocation graph.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │     harvester     │  graph::{refs, calls, traverse}
//! └──┬─────────────┬──┘
//!    │             │
//! ┌──▼─────────┐ ┌─▼────────┐
//! │ workspace  │ │ schedule │  bootstrap + bounded fan-out
//! └──┬─────────┘ └─┬────────┘
//!    │             │
//! ┌──▼─────────────▼──┐
//! │    LSP client     │  lifecycle, correlation, documents
//! └──┬────────────────┘
//!    │ Content-Length framed JSON-RPC over stdio
//! ┌──▼────────────────┐
//! │  language server  │  (pyright / tsserver / clangd)
//! └───────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`error`] - Error types for the entire application
//! - [`lsp`] - Framed transport and the LSP client core
//! - [`workspace`] - Language detection, enumeration, bootstrap, watching
//! - [`schedule`] - Bounded-concurrency request fan-out
//! - [`graph`] - Symbol selection, reference crawl, edge assembly
//!
//! # Example
//!
//! ```ignore
//! use lspgraph::graph::{HarvestOptions, ReferenceHarvester};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let harvester = ReferenceHarvester::new(".", HarvestOptions::default());
//!     for edge in harvester.harvest().await? {
//!         println!("{edge}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod graph;
pub mod lsp;
pub mod schedule;
pub mod workspace;

// Re-export commonly used types at the crate root
pub use error::{Error, Result};
pub use graph::{Edge, EdgeSet, Relation};
