//! File-watcher synchronization.
//!
//! A background task observes filesystem events under the workspace root
//! and keeps the language server's view of documents in sync with disk:
//! added files are opened, modifications are pushed as changes, deletions
//! are closed. The task exits promptly when the client begins shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::EventKind;
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::lsp::{LspClient, path_to_uri};

use super::lang::Language;
use super::walk::DEFAULT_SKIP_DIRS;

/// Spawns the watcher task for a workspace. The task runs until the
/// client's shutdown signal flips or the watcher backend dies.
pub fn spawn_watcher(
    client: Arc<LspClient>,
    root: PathBuf,
    language: Language,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(watch_and_sync(client, root, language))
}

/// Watches `root` and forwards relevant events to the client as document
/// notifications.
pub async fn watch_and_sync(client: Arc<LspClient>, root: PathBuf, language: Language) {
    if !root.exists() {
        error!("root path does not exist: {}", root.display());
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = match notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("failed to create file watcher: {e}");
            return;
        }
    };
    if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
        error!("failed to watch {}: {e}", root.display());
        return;
    }
    trace!("starting file watcher for: {}", root.display());

    let mut shutdown = client.shutdown_signal();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = rx.recv() => {
                match event {
                    None => break,
                    Some(Err(e)) => {
                        if !client.is_closing() {
                            error!("file watcher error: {e}");
                        }
                    }
                    Some(Ok(event)) => {
                        if client.is_closing() {
                            break;
                        }
                        for path in &event.paths {
                            if should_process(path, &root, language) {
                                handle_change(&client, &event.kind, path).await;
                            }
                        }
                    }
                }
            }
        }
    }
    trace!("file watcher stopped for: {}", root.display());
}

/// Event paths must belong to the workspace's language and lie outside the
/// skip directories.
fn should_process(path: &Path, root: &Path, language: Language) -> bool {
    if !language.matches_path(path) {
        return false;
    }
    if !path.starts_with(root) {
        return false;
    }
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| DEFAULT_SKIP_DIRS.contains(&name))
    })
}

async fn handle_change(client: &LspClient, kind: &EventKind, path: &Path) {
    let uri = match path_to_uri(path) {
        Ok(uri) => uri,
        Err(e) => {
            warn!("could not derive URI for {}: {e}", path.display());
            return;
        }
    };

    let result = match kind {
        EventKind::Remove(_) => client.did_close(&uri).await,
        EventKind::Create(_) | EventKind::Modify(_) => {
            let content = match tokio::fs::read(path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    warn!("could not read file {}: {e}", path.display());
                    return;
                }
            };
            match kind {
                EventKind::Create(_) => client.did_open(&uri, &content, "").await,
                _ => client.did_change(&uri, &content).await,
            }
        }
        _ => return,
    };

    if let Err(e) = result {
        if !client.is_closing() {
            error!("error handling file change {}: {e}", path.display());
        }
    }
}
