//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod temp_workspace;

use std::time::Duration;

// Re-export for convenience
pub use temp_workspace::TestWorkspace;

/// Checks whether a language server binary is runnable. Tests that need a
/// real server skip themselves (with a note on stderr) when it is not.
pub fn server_available(command: &str) -> bool {
    std::process::Command::new(command)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Whether pyright is installed; the integration scenarios drive Python
/// workspaces.
pub fn pyright_available() -> bool {
    if !server_available("pyright-langserver") {
        eprintln!("skipping: pyright-langserver not installed");
        return false;
    }
    true
}

/// Gives the server time to index the opened documents. CI boxes are slow.
pub async fn settle() {
    let wait = if std::env::var("CI").is_ok() {
        Duration::from_millis(8000)
    } else {
        Duration::from_millis(2000)
    };
    tokio::time::sleep(wait).await;
}
