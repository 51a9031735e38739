//! LSP (Language Server Protocol) client module.
//!
//! This module implements the client side of LSP over a child process's
//! stdio pipes: the framed JSON-RPC transport, the lifecycle and
//! correlation machinery, and the document-state tracking the extraction
//! layers build on.
//!
//! # Architecture
//!
//! - `transport`: Content-Length framing over async streams
//! - `client`: lifecycle state machine, request correlation, dispatch,
//!   document synchronization
//! - `types`: URI helpers and the typed subset of LSP payloads in use

pub mod client;
pub mod transport;
pub mod types;

use crate::error::LspError;

/// Result type for LSP operations.
pub type LspResult<T> = std::result::Result<T, LspError>;

pub use client::{ClientState, DocumentStatus, LspClient, LspConfig, ServerCommand};
pub use types::{ReferencesResult, SymbolRecord, path_to_uri, uri_relpath, uri_to_path};

// Re-export the lsp-types vocabulary used across the crate.
pub use lsp_types::{Location, Position, Range, SymbolKind, Url};
