//! Error types for lspgraph.
//!
//! This module defines all error types used throughout the application,
//! organized by subsystem: LSP client, workspace bootstrap, and graph
//! extraction.

use std::time::Duration;

use thiserror::Error;

/// Errors related to LSP client operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// An operation was requested in the wrong lifecycle state.
    #[error("invalid client state: {0}")]
    InvalidState(String),

    /// A request carried an invalid URI or position.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The language server binary was not found on PATH.
    #[error("language server not installed: expected `{command}` on PATH")]
    ServerNotInstalled {
        /// The command that could not be spawned.
        command: String,
    },

    /// The language server process failed to start for another reason.
    #[error("failed to start language server: {0}")]
    ServerStartFailed(String),

    /// Writing to or reading from the server's stdio pipes failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request's per-call deadline was exceeded.
    #[error("request `{method}` (id {id}) timed out after {timeout:?}")]
    Timeout {
        /// The LSP method name.
        method: String,
        /// The request id.
        id: i64,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The language server returned an `error` member in its response.
    #[error("language server error: {message} (code: {code})")]
    ServerError {
        /// The error code from the language server.
        code: i64,
        /// The error message from the language server.
        message: String,
    },

    /// The request was cancelled because the client shut down.
    #[error("request cancelled by client shutdown")]
    Cancelled,

    /// A response body could not be decoded into the expected shape.
    #[error("failed to parse language server response: {0}")]
    Parse(String),
}

/// Errors related to workspace enumeration and bootstrap.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No supported language could be detected under the root.
    #[error("no supported language detected under {0}")]
    NoLanguage(String),

    /// The workspace root could not be resolved.
    #[error("failed to resolve workspace root `{path}`: {source}")]
    RootNotFound {
        /// The path as given by the caller.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// IO error during enumeration or bootstrap.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unified error type for the entire application.
#[derive(Debug, Error)]
pub enum Error {
    /// LSP-related error.
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Workspace-related error.
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// A language server handed back a symbol kind the extractor cannot
    /// seed from; treated as a server bug.
    #[error("unexpected symbol kind {kind} for `{name}`, expected function, method, or class")]
    UnexpectedSymbolKind {
        /// The raw LSP kind code.
        kind: u32,
        /// The symbol name.
        name: String,
    },

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for lspgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsp_error_display() {
        let err = LspError::ServerNotInstalled {
            command: "pyright-langserver".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "language server not installed: expected `pyright-langserver` on PATH"
        );
    }

    #[test]
    fn test_timeout_display_names_method() {
        let err = LspError::Timeout {
            method: "textDocument/references".to_string(),
            id: 7,
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("textDocument/references"));
        assert!(err.to_string().contains("id 7"));
    }

    #[test]
    fn test_error_conversion() {
        let lsp_err = LspError::Cancelled;
        let err: Error = lsp_err.into();
        assert!(matches!(err, Error::Lsp(LspError::Cancelled)));
    }

    #[test]
    fn test_workspace_error_conversion() {
        let ws_err = WorkspaceError::NoLanguage("/tmp/empty".to_string());
        let err: Error = ws_err.into();
        assert!(matches!(
            err,
            Error::Workspace(WorkspaceError::NoLanguage(_))
        ));
    }
}
