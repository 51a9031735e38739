//! Workspace bootstrap.
//!
//! [`open_workspace`] is the façade the extraction layers start from: it
//! detects the dominant language under a root, spawns the matching
//! language server, and opens every enumerated source file with it. The
//! resulting [`Workspace`] owns exactly one client for exactly one root.

pub mod lang;
pub mod walk;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{Result, WorkspaceError};
use crate::lsp::{LspClient, path_to_uri};

pub use lang::{Language, detect_languages};
pub use walk::{DEFAULT_SKIP_DIRS, list_files, list_source_files};
pub use watch::spawn_watcher;

/// A bootstrapped workspace: one resolved root, one running client.
pub struct Workspace {
    client: Arc<LspClient>,
    root: PathBuf,
    language: Language,
}

impl Workspace {
    /// The running client.
    pub fn client(&self) -> &LspClient {
        &self.client
    }

    /// A shared handle to the client, for background tasks.
    pub fn client_handle(&self) -> Arc<LspClient> {
        Arc::clone(&self.client)
    }

    /// The resolved workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The language the workspace was opened for.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Starts the file-watcher task for this workspace.
    pub fn watch(&self) -> tokio::task::JoinHandle<()> {
        spawn_watcher(self.client_handle(), self.root.clone(), self.language)
    }

    /// Shuts the client down.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }
}

/// Detects the dominant language under `root`, spawns its server, and
/// opens every matched source file.
///
/// Empty files are skipped. File contents are read as UTF-8 with
/// replacement; unreadable files are logged and skipped.
///
/// ## Errors
/// [`WorkspaceError::NoLanguage`] when nothing recognizable is found;
/// otherwise whatever the client start or open notifications surface.
pub async fn open_workspace(root: &Path) -> Result<Workspace> {
    let root = root
        .canonicalize()
        .map_err(|e| WorkspaceError::RootNotFound {
            path: root.display().to_string(),
            source: e,
        })?;

    let languages = detect_languages(&root);
    let Some(language) = languages.first().copied() else {
        return Err(WorkspaceError::NoLanguage(root.display().to_string()).into());
    };
    trace!("detected dominant language: {language} for path: {}", root.display());

    let root_uri = path_to_uri(&root)?;
    let client = LspClient::new(root_uri);
    client.start(&language.server_command()).await?;
    debug!("started LSP client for {language} at {}", root.display());

    for file in list_source_files(&root, language) {
        let content = match tokio::fs::read(&file).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("could not read file {}: {e}", file.display());
                continue;
            }
        };
        if content.is_empty() {
            continue;
        }
        let uri = match path_to_uri(&file) {
            Ok(uri) => uri,
            Err(e) => {
                warn!("could not derive URI for {}: {e}", file.display());
                continue;
            }
        };
        client
            .did_open(&uri, &content, language.language_id())
            .await?;
    }

    Ok(Workspace {
        client: Arc::new(client),
        root,
        language,
    })
}
