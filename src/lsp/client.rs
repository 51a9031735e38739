//! LSP client core.
//!
//! [`LspClient`] owns one language-server child process and everything
//! needed to talk to it: the lifecycle state machine, the request/response
//! correlation table, the receive-loop task that dispatches incoming
//! frames, and the per-document state the server has been told about.
//!
//! One client instance serves exactly one workspace root. The receive loop
//! is the only reader of the child's stdout; callers only enqueue work by
//! registering pending entries and writing frames to stdin.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities,
    DidChangeWatchedFilesClientCapabilities, DocumentSymbolClientCapabilities,
    DynamicRegistrationClientCapabilities, GotoCapability, HoverClientCapabilities,
    InitializeParams, Location, TextDocumentClientCapabilities,
    TextDocumentSyncClientCapabilities, Url, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities, WorkspaceFolder,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::LspError;

use super::LspResult;
use super::transport;
use super::types::{ReferencesResult, SymbolRecord};

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for the shutdown handshake and child termination.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The command used to spawn a language server. Argument vector only; no
/// shell is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// The executable looked up on PATH.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl ServerCommand {
    /// Builds a command from a program name and its arguments.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct LspConfig {
    /// Per-request deadline used when a call does not override it.
    pub request_timeout: Duration,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started, or fully torn down. The initial and terminal state.
    Stopped,
    /// Child spawned, initialize handshake in flight.
    Starting,
    /// Ready for requests.
    Running,
    /// Shutdown in progress.
    Stopping,
}

/// Lifecycle status of a tracked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Opened, unmodified since.
    Open,
    /// Content replaced at least once since opening.
    Changed,
}

/// State held for each document the server has been told about.
#[derive(Debug, Clone)]
struct DocumentState {
    content: String,
    language_id: String,
    version: i32,
    status: DocumentStatus,
}

type PendingMap = HashMap<i64, oneshot::Sender<Value>>;

/// The child's stdin, behind the write trait so tests can substitute an
/// in-memory stream.
type MessageWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// LSP client over a language server's stdio pipes.
pub struct LspClient {
    root_uri: Url,
    config: LspConfig,
    next_id: AtomicI64,
    state: StdMutex<ClientState>,
    pending: Arc<Mutex<PendingMap>>,
    documents: Mutex<HashMap<Url, DocumentState>>,
    writer: Mutex<Option<MessageWriter>>,
    child: Mutex<Option<Child>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    // Serializes shutdown so a second caller awaits the first.
    shutdown_guard: Mutex<()>,
}

impl std::fmt::Debug for LspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspClient")
            .field("root_uri", &self.root_uri.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl LspClient {
    /// Creates a stopped client for the given workspace root URI.
    pub fn new(root_uri: Url) -> Self {
        Self::with_config(root_uri, LspConfig::default())
    }

    /// Creates a stopped client with an explicit configuration.
    pub fn with_config(root_uri: Url, config: LspConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            root_uri,
            config,
            next_id: AtomicI64::new(1),
            state: StdMutex::new(ClientState::Stopped),
            pending: Arc::new(Mutex::new(HashMap::new())),
            documents: Mutex::new(HashMap::new()),
            writer: Mutex::new(None),
            child: Mutex::new(None),
            tasks: StdMutex::new(Vec::new()),
            shutdown_tx,
            shutdown_guard: Mutex::new(()),
        }
    }

    /// The workspace root URI this client was created for.
    pub fn root_uri(&self) -> &Url {
        &self.root_uri
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.lock().expect("state lock")
    }

    /// Whether the client is shutting down or already stopped.
    pub fn is_closing(&self) -> bool {
        matches!(self.state(), ClientState::Stopping | ClientState::Stopped)
    }

    /// A receiver that flips to `true` when shutdown begins. Background
    /// tasks (the receive loop, the file watcher) poll this.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    // ========== Lifecycle ==========

    /// Spawns the language server and performs the initialize handshake.
    ///
    /// ## Errors
    /// [`LspError::InvalidState`] when not stopped;
    /// [`LspError::ServerNotInstalled`] when the binary is missing;
    /// any spawn or handshake failure after cleanup.
    pub async fn start(&self, command: &ServerCommand) -> LspResult<()> {
        {
            let mut state = self.state.lock().expect("state lock");
            if *state != ClientState::Stopped {
                return Err(LspError::InvalidState(format!(
                    "cannot start client in state {state:?}"
                )));
            }
            *state = ClientState::Starting;
        }
        self.shutdown_tx.send_replace(false);

        match self.spawn_and_initialize(command).await {
            Ok(()) => {
                *self.state.lock().expect("state lock") = ClientState::Running;
                trace!("LSP client started successfully");
                Ok(())
            }
            Err(e) => {
                self.shutdown_tx.send_replace(true);
                self.cleanup().await;
                *self.state.lock().expect("state lock") = ClientState::Stopped;
                Err(e)
            }
        }
    }

    async fn spawn_and_initialize(&self, command: &ServerCommand) -> LspResult<()> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LspError::ServerNotInstalled {
                        command: command.program.clone(),
                    }
                } else {
                    LspError::ServerStartFailed(format!(
                        "failed to spawn `{}`: {e}",
                        command.program
                    ))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stderr".to_string()))?;

        *self.writer.lock().await = Some(Box::new(stdin));
        *self.child.lock().await = Some(child);

        let receive = tokio::spawn(receive_loop(
            BufReader::new(stdout),
            Arc::clone(&self.pending),
            self.shutdown_tx.subscribe(),
        ));
        // Drain stderr continuously so the child never blocks on a full
        // pipe; lines surface at trace level.
        let drain = tokio::spawn(drain_stderr(stderr));
        {
            let mut tasks = self.tasks.lock().expect("tasks lock");
            tasks.push(receive);
            tasks.push(drain);
        }

        let params = serde_json::to_value(self.initialize_params())
            .map_err(|e| LspError::ServerStartFailed(format!("initialize params: {e}")))?;
        self.send_request("initialize", params, self.config.request_timeout)
            .await?;
        self.notify("initialized", json!({})).await?;
        Ok(())
    }

    #[allow(deprecated)] // root_uri is deprecated in LSP but servers still want it
    fn initialize_params(&self) -> InitializeParams {
        let name = self
            .root_uri
            .to_file_path()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "workspace".to_string());

        InitializeParams {
            // The server is not asked to monitor the client's process.
            process_id: None,
            root_uri: Some(self.root_uri.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: self.root_uri.clone(),
                name,
            }]),
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    synchronization: Some(TextDocumentSyncClientCapabilities {
                        dynamic_registration: Some(true),
                        will_save: Some(true),
                        did_save: Some(true),
                        ..Default::default()
                    }),
                    completion: Some(CompletionClientCapabilities {
                        dynamic_registration: Some(true),
                        ..Default::default()
                    }),
                    hover: Some(HoverClientCapabilities {
                        dynamic_registration: Some(true),
                        ..Default::default()
                    }),
                    definition: Some(GotoCapability {
                        dynamic_registration: Some(true),
                        ..Default::default()
                    }),
                    references: Some(DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(true),
                    }),
                    document_symbol: Some(DocumentSymbolClientCapabilities {
                        dynamic_registration: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceClientCapabilities {
                    apply_edit: Some(true),
                    workspace_edit: Some(WorkspaceEditClientCapabilities {
                        document_changes: Some(true),
                        ..Default::default()
                    }),
                    did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(true),
                    }),
                    did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                        dynamic_registration: Some(true),
                        relative_pattern_support: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            client_info: Some(ClientInfo {
                name: "lspgraph".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        }
    }

    /// Shuts the client down.
    ///
    /// Cancels all pending requests, attempts the LSP `shutdown`/`exit`
    /// handshake (failures tolerated), and terminates the child. Idempotent:
    /// a concurrent second call awaits the first and returns.
    pub async fn shutdown(&self) {
        let _guard = self.shutdown_guard.lock().await;
        {
            let mut state = self.state.lock().expect("state lock");
            if matches!(*state, ClientState::Stopped) {
                return;
            }
            *state = ClientState::Stopping;
        }
        trace!("shutting down LSP client");

        // Cancel outstanding requests first; their callers observe
        // cancellation rather than waiting out individual timeouts.
        self.pending.lock().await.clear();

        match self
            .send_request("shutdown", json!({}), SHUTDOWN_GRACE)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!("LSP shutdown request failed or timed out: {e}"),
        }
        if let Err(e) = self.notify("exit", json!({})).await {
            warn!("LSP exit notification failed: {e}");
        }

        self.shutdown_tx.send_replace(true);
        self.cleanup().await;
        *self.state.lock().expect("state lock") = ClientState::Stopped;
        trace!("LSP client shutdown complete");
    }

    async fn cleanup(&self) {
        // Dropping stdin closes the pipe; well-behaved servers exit on it.
        *self.writer.lock().await = None;

        let tasks: Vec<_> = self.tasks.lock().expect("tasks lock").drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("background task did not complete within grace period");
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match child.try_wait() {
                Ok(Some(status)) => trace!("language server exited with {status}"),
                _ => {
                    terminate(&child);
                    match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                        Ok(Ok(status)) => trace!("language server exited with {status}"),
                        _ => {
                            warn!("language server ignored SIGTERM, killing");
                            let _ = child.kill().await;
                        }
                    }
                }
            }
        }

        self.documents.lock().await.clear();
        self.pending.lock().await.clear();
    }

    // ========== JSON-RPC plumbing ==========

    async fn send(&self, msg: Value) -> LspResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LspError::Transport("language server stdin not available".into()))?;
        transport::write_message(writer, &msg)
            .await
            .map_err(|e| LspError::Transport(format!("failed to send message: {e}")))
    }

    /// Sends a request and awaits the correlated response.
    ///
    /// Requests other than `initialize` are rejected outside `Running`.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> LspResult<Value> {
        {
            let state = self.state();
            if state != ClientState::Running && method != "initialize" {
                return Err(LspError::InvalidState(format!(
                    "cannot send `{method}` in state {state:?}"
                )));
            }
        }
        self.send_request(method, params, timeout.unwrap_or(self.config.request_timeout))
            .await
    }

    /// Correlation core, free of state checks so the shutdown handshake can
    /// use it from the `Stopping` state.
    async fn send_request(&self, method: &str, params: Value, timeout: Duration) -> LspResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let msg = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(e) = self.send(msg).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => msg,
            Ok(Err(_)) => {
                // The sender was dropped: shutdown cleared the table.
                self.pending.lock().await.remove(&id);
                return Err(LspError::Cancelled);
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(LspError::Timeout {
                    method: method.to_string(),
                    id,
                    timeout,
                });
            }
        };

        if let Some(err) = response.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(LspError::ServerError { code, message });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Sends a fire-and-forget notification.
    pub(crate) async fn notify(&self, method: &str, params: Value) -> LspResult<()> {
        {
            let state = self.state();
            let lifecycle_method = matches!(method, "initialized" | "exit");
            if !matches!(state, ClientState::Running | ClientState::Starting) && !lifecycle_method
            {
                return Err(LspError::InvalidState(format!(
                    "cannot send notification `{method}` in state {state:?}"
                )));
            }
        }
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await
    }

    // ========== Document synchronization ==========

    /// Opens a document, or replaces its content if it is already open.
    ///
    /// Re-opening bumps the version and degrades to a `didChange`, which
    /// keeps the bootstrap path idempotent.
    pub async fn did_open(&self, uri: &Url, content: &str, language_id: &str) -> LspResult<()> {
        let mut docs = self.documents.lock().await;
        if let Some(doc) = docs.get_mut(uri) {
            doc.content = content.to_string();
            doc.version += 1;
            doc.status = DocumentStatus::Changed;
            let version = doc.version;
            return self
                .notify(
                    "textDocument/didChange",
                    json!({
                        "textDocument": {"uri": uri, "version": version},
                        "contentChanges": [{"text": content}],
                    }),
                )
                .await;
        }

        docs.insert(
            uri.clone(),
            DocumentState {
                content: content.to_string(),
                language_id: language_id.to_string(),
                version: 1,
                status: DocumentStatus::Open,
            },
        );
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": 1,
                    "text": content,
                },
            }),
        )
        .await
    }

    /// Replaces a document's content. An unknown URI degrades to a
    /// `didOpen`, tolerating bootstrap ordering.
    pub async fn did_change(&self, uri: &Url, content: &str) -> LspResult<()> {
        {
            let mut docs = self.documents.lock().await;
            if let Some(doc) = docs.get_mut(uri) {
                doc.content = content.to_string();
                doc.version += 1;
                doc.status = DocumentStatus::Changed;
                let version = doc.version;
                return self
                    .notify(
                        "textDocument/didChange",
                        json!({
                            "textDocument": {"uri": uri, "version": version},
                            "contentChanges": [{"text": content}],
                        }),
                    )
                    .await;
            }
        }
        self.did_open(uri, content, "").await
    }

    /// Closes a document. Unknown URIs are a silent no-op.
    pub async fn did_close(&self, uri: &Url) -> LspResult<()> {
        let mut docs = self.documents.lock().await;
        if docs.remove(uri).is_none() {
            return Ok(());
        }
        self.notify(
            "textDocument/didClose",
            json!({"textDocument": {"uri": uri}}),
        )
        .await
    }

    /// Returns the cached content for a URI, or the empty string if the
    /// document is not open.
    pub async fn read_file(&self, uri: &Url) -> String {
        self.documents
            .lock()
            .await
            .get(uri)
            .map(|doc| doc.content.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the currently open document URIs.
    pub async fn open_files(&self) -> Vec<Url> {
        self.documents.lock().await.keys().cloned().collect()
    }

    /// Current version of a tracked document.
    pub async fn document_version(&self, uri: &Url) -> Option<i32> {
        self.documents.lock().await.get(uri).map(|doc| doc.version)
    }

    /// Lifecycle status of a tracked document.
    pub async fn document_status(&self, uri: &Url) -> Option<DocumentStatus> {
        self.documents.lock().await.get(uri).map(|doc| doc.status)
    }

    // ========== High-level requests ==========

    /// Fetches the symbols of a document.
    pub async fn document_symbol(&self, uri: &Url) -> LspResult<Vec<SymbolRecord>> {
        let result = self
            .request(
                "textDocument/documentSymbol",
                json!({"textDocument": {"uri": uri}}),
                None,
            )
            .await?;
        SymbolRecord::parse_list(result)
    }

    /// Finds references to the symbol at a position. Declarations are
    /// excluded. The result echoes the request parameters and carries the
    /// round-trip duration.
    pub async fn references(
        &self,
        uri: &Url,
        line: u32,
        character: u32,
        name: &str,
        timeout: Option<Duration>,
    ) -> LspResult<ReferencesResult> {
        let started = Instant::now();
        let result = self
            .request(
                "textDocument/references",
                json!({
                    "textDocument": {"uri": uri},
                    "position": {"line": line, "character": character},
                    "context": {"includeDeclaration": false},
                }),
                timeout,
            )
            .await?;

        let locations: Vec<Location> = if result.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(result)
                .map_err(|e| LspError::Parse(format!("references result: {e}")))?
        };

        Ok(ReferencesResult {
            uri: uri.clone(),
            line,
            character,
            name: name.to_string(),
            locations,
            duration: started.elapsed(),
        })
    }

    /// Resolves the definition location(s) for the symbol at a position.
    pub async fn definition(&self, uri: &Url, line: u32, character: u32) -> LspResult<Vec<Location>> {
        let result = self
            .request(
                "textDocument/definition",
                json!({
                    "textDocument": {"uri": uri},
                    "position": {"line": line, "character": character},
                }),
                None,
            )
            .await?;
        parse_locations(result)
    }
}

/// Decodes a definition result: null, a single location, or an array of
/// locations or location links.
fn parse_locations(result: Value) -> LspResult<Vec<Location>> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    if result.is_object() {
        let loc: Location = serde_json::from_value(result)
            .map_err(|e| LspError::Parse(format!("definition result: {e}")))?;
        return Ok(vec![loc]);
    }
    // Arrays hold either Location or LocationLink entries.
    let items = result
        .as_array()
        .ok_or_else(|| LspError::Parse("definition result is not a location".into()))?;
    let mut locations = Vec::with_capacity(items.len());
    for item in items {
        if item.get("targetUri").is_some() {
            let uri = serde_json::from_value(item["targetUri"].clone())
                .map_err(|e| LspError::Parse(format!("location link uri: {e}")))?;
            let range = serde_json::from_value(
                item.get("targetSelectionRange")
                    .or_else(|| item.get("targetRange"))
                    .cloned()
                    .unwrap_or(Value::Null),
            )
            .map_err(|e| LspError::Parse(format!("location link range: {e}")))?;
            locations.push(Location { uri, range });
        } else {
            let loc: Location = serde_json::from_value(item.clone())
                .map_err(|e| LspError::Parse(format!("definition location: {e}")))?;
            locations.push(loc);
        }
    }
    Ok(locations)
}

/// Sends SIGTERM to the child (unix), giving it a chance to exit before
/// the SIGKILL fallback.
fn terminate(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Safety: plain kill(2) on a pid we own.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Drains the child's stderr so it never blocks on a full pipe; lines
/// surface at trace level.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!("server stderr: {line}");
    }
}

/// Reads framed messages from the server's stdout and dispatches each one
/// until shutdown is signalled or the stream ends.
async fn receive_loop(
    mut reader: BufReader<ChildStdout>,
    pending: Arc<Mutex<PendingMap>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = transport::read_message(&mut reader) => {
                match frame {
                    Ok(Some(msg)) => dispatch(&pending, msg).await,
                    Ok(None) => {
                        trace!("language server stdout closed");
                        break;
                    }
                    Err(e) => {
                        if *shutdown.borrow() {
                            break;
                        }
                        error!("receive loop error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Classifies one incoming frame and routes it.
async fn dispatch(pending: &Mutex<PendingMap>, msg: Value) {
    let id = msg.get("id").and_then(Value::as_i64);
    let method = msg.get("method").and_then(Value::as_str);

    match (id, method) {
        // Response to one of our requests.
        (Some(id), None) => {
            let sender = pending.lock().await.remove(&id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(msg);
                }
                // Late responses to timed-out or cancelled requests.
                None => trace!("response for unknown request id {id}"),
            }
        }
        // Server-initiated notification.
        (None, Some(method)) => {
            let params = msg.get("params").cloned().unwrap_or(Value::Null);
            handle_notification(method, &params);
        }
        // Server-initiated request: not serviced.
        (Some(id), Some(method)) => {
            trace!("ignoring server-initiated request `{method}` (id {id})");
        }
        (None, None) => trace!("frame with neither id nor method, ignoring"),
    }
}

fn handle_notification(method: &str, params: &Value) {
    match method {
        "textDocument/publishDiagnostics" => {
            let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
            let count = params
                .get("diagnostics")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            if count > 0 {
                trace!("diagnostics for {uri}: {count} issues");
            }
        }
        "window/logMessage" => {
            let message = params.get("message").and_then(Value::as_str).unwrap_or("");
            // 1=error, 2=warning, 3=info, 4=log; info and below are noise.
            match params.get("type").and_then(Value::as_i64).unwrap_or(1) {
                1 => error!("LSP: {message}"),
                2 => warn!("LSP: {message}"),
                _ => {}
            }
        }
        "window/showMessage" => {
            let message = params.get("message").and_then(Value::as_str).unwrap_or("");
            let kind = params.get("type").and_then(Value::as_i64).unwrap_or(1);
            trace!("LSP message (type {kind}): {message}");
        }
        other => debug!("unhandled notification `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root() -> Url {
        Url::parse("file:///workspace").unwrap()
    }

    fn doc_uri(name: &str) -> Url {
        Url::parse(&format!("file:///workspace/{name}")).unwrap()
    }

    /// Wires the client's writer to an in-memory duplex stream and marks it
    /// running, so document operations can be exercised without a server.
    async fn running_client() -> (LspClient, tokio::io::DuplexStream) {
        let client = LspClient::new(test_root());
        let (tx, rx) = tokio::io::duplex(64 * 1024);
        *client.state.lock().unwrap() = ClientState::Running;
        *client.writer.lock().await = Some(Box::new(tx));
        (client, rx)
    }

    /// Closes the client's writer and reads back every frame it emitted.
    async fn emitted_frames(client: &LspClient, rx: tokio::io::DuplexStream) -> Vec<Value> {
        *client.writer.lock().await = None;
        let mut reader = tokio::io::BufReader::new(rx);
        let mut out = Vec::new();
        while let Some(msg) = transport::read_message(&mut reader).await.unwrap() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_did_open_versions_are_monotonic() {
        let (client, rx) = running_client().await;
        let uri = doc_uri("a.py");

        client.did_open(&uri, "x = 1\n", "python").await.unwrap();
        assert_eq!(client.document_version(&uri).await, Some(1));
        assert_eq!(client.document_status(&uri).await, Some(DocumentStatus::Open));

        // Re-opening replaces content and bumps the version.
        client.did_open(&uri, "x = 2\n", "python").await.unwrap();
        assert_eq!(client.document_version(&uri).await, Some(2));
        assert_eq!(client.read_file(&uri).await, "x = 2\n");
        assert_eq!(
            client.document_status(&uri).await,
            Some(DocumentStatus::Changed)
        );

        let frames = emitted_frames(&client, rx).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["method"], json!("textDocument/didOpen"));
        assert_eq!(frames[0]["params"]["textDocument"]["version"], json!(1));
        assert_eq!(frames[1]["method"], json!("textDocument/didChange"));
        assert_eq!(frames[1]["params"]["textDocument"]["version"], json!(2));
    }

    #[tokio::test]
    async fn test_did_change_unknown_uri_degrades_to_open() {
        let (client, rx) = running_client().await;
        let uri = doc_uri("b.py");

        client.did_change(&uri, "y = 1\n").await.unwrap();
        assert_eq!(client.document_version(&uri).await, Some(1));

        client.did_change(&uri, "y = 2\n").await.unwrap();
        assert_eq!(client.document_version(&uri).await, Some(2));

        let frames = emitted_frames(&client, rx).await;
        assert_eq!(frames[0]["method"], json!("textDocument/didOpen"));
        assert_eq!(frames[1]["method"], json!("textDocument/didChange"));
    }

    #[tokio::test]
    async fn test_did_close_unknown_uri_is_silent_noop() {
        let (client, rx) = running_client().await;
        let uri = doc_uri("never_opened.py");

        client.did_close(&uri).await.unwrap();

        let frames = emitted_frames(&client, rx).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_did_close_removes_document_state() {
        let (client, rx) = running_client().await;
        let uri = doc_uri("c.py");

        client.did_open(&uri, "z = 1\n", "python").await.unwrap();
        client.did_close(&uri).await.unwrap();

        assert_eq!(client.read_file(&uri).await, "");
        assert_eq!(client.document_version(&uri).await, None);
        assert!(client.open_files().await.is_empty());

        let frames = emitted_frames(&client, rx).await;
        assert_eq!(frames[1]["method"], json!("textDocument/didClose"));
    }

    #[tokio::test]
    async fn test_read_file_unknown_uri_is_empty() {
        let (client, _rx) = running_client().await;
        assert_eq!(client.read_file(&doc_uri("ghost.py")).await, "");
    }

    #[tokio::test]
    async fn test_request_outside_running_is_invalid_state() {
        let client = LspClient::new(test_root());
        let uri = Url::parse("file:///workspace/a.py").unwrap();
        let err = client.document_symbol(&uri).await.unwrap_err();
        assert!(matches!(err, LspError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let client = LspClient::new(test_root());
        *client.state.lock().unwrap() = ClientState::Running;
        let err = client
            .start(&ServerCommand::new("definitely-not-a-server", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, LspError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_server_not_installed() {
        let client = LspClient::new(test_root());
        let err = client
            .start(&ServerCommand::new("lspgraph-no-such-binary-xyz", &[]))
            .await
            .unwrap_err();
        match err {
            LspError::ServerNotInstalled { command } => {
                assert_eq!(command, "lspgraph-no-such-binary-xyz");
            }
            other => panic!("expected ServerNotInstalled, got {other:?}"),
        }
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_dispatch_resolves_pending_request() {
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        dispatch(&pending, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}})).await;

        let msg = rx.await.unwrap();
        assert_eq!(msg["result"]["ok"], json!(true));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_ignores_server_initiated_request() {
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(3, tx);

        // Same id, but carries a method: a server-initiated request must
        // not be routed into the correlation table.
        dispatch(
            &pending,
            json!({"jsonrpc": "2.0", "id": 3, "method": "workspace/configuration", "params": {}}),
        )
        .await;

        assert!(pending.lock().await.contains_key(&3));
        drop(rx);
    }

    #[tokio::test]
    async fn test_dispatch_notifications_do_not_panic() {
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        for params in [
            json!({"uri": "file:///a.py", "diagnostics": [{"message": "x"}]}),
            json!({"message": "oops", "type": 1}),
            json!({"message": "hello", "type": 3}),
        ] {
            dispatch(
                &pending,
                json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": params}),
            )
            .await;
        }
        dispatch(&pending, json!({"jsonrpc": "2.0"})).await;
    }

    #[test]
    fn test_parse_locations_shapes() {
        let single = json!({
            "uri": "file:///a.py",
            "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 4}}
        });
        assert_eq!(parse_locations(single).unwrap().len(), 1);

        let array = json!([
            {
                "uri": "file:///a.py",
                "range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 4}}
            },
            {
                "targetUri": "file:///b.py",
                "targetRange": {"start": {"line": 0, "character": 0}, "end": {"line": 2, "character": 0}},
                "targetSelectionRange": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 7}}
            }
        ]);
        let locations = parse_locations(array).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[1].uri.as_str(), "file:///b.py");
        assert_eq!(locations[1].range.start.character, 4);

        assert!(parse_locations(Value::Null).unwrap().is_empty());
    }
}
