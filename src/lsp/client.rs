/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Low-level LSP client for a single server process (C2 LSP half, C3 capability state).

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams, CallHierarchyItem,
    CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
    ClientCapabilities, CodeActionParams, CodeActionResponse, CompletionParams, CompletionResponse,
    Diagnostic, DidChangeTextDocumentParams, DidChangeWorkspaceFoldersParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    DocumentDiagnosticParams, DocumentDiagnosticReport, DocumentFormattingParams,
    DocumentRangeFormattingParams, DocumentSymbolParams, DocumentSymbolResponse,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams, InitializeParams,
    InitializeResult, InitializedParams, PositionEncodingKind, PublishDiagnosticsParams,
    ReferenceParams, RenameFilesParams, RenameParams, SignatureHelp, SignatureHelpParams,
    TextDocumentIdentifier, TextEdit, TypeHierarchyItem, TypeHierarchyPrepareParams,
    TypeHierarchySubtypesParams, TypeHierarchySupertypesParams, Uri, WorkspaceEdit,
    WorkspaceFolder, WorkspaceFoldersChangeEvent, WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, trace, warn};

use super::protocol::{self, NotificationMessage, RequestId, RequestMessage, ResponseMessage};

/// Cached diagnostics for a file plus the generation counter and timestamp
/// used by the document sync cache's idle-convergence wait (spec §4.3).
#[derive(Debug, Default, Clone)]
pub struct DiagnosticsEntry {
    /// Most recently published diagnostics for this URI.
    pub diagnostics: Vec<Diagnostic>,
    /// Monotonic generation counter, bumped on every push.
    pub generation: u64,
    /// Wall-clock instant of the last push, for idle-window detection.
    pub last_update: Option<Instant>,
}

type DiagnosticsCache = Arc<Mutex<HashMap<Uri, DiagnosticsEntry>>>;

/// Default timeout for interactive LSP calls (spec §4.1).
pub const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for `textDocument/hover` (spec §4.1).
pub const HOVER_TIMEOUT: Duration = Duration::from_secs(30);
/// Default idle-wait timeout for diagnostics retrieval tier 3 (spec §4.3).
pub const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle window: no push update for this long means "settled" (spec §4.3).
pub const DIAGNOSTICS_IDLE_WINDOW: Duration = Duration::from_millis(300);
/// Max wait for the first idle-convergence attempt (spec §4.3).
pub const DIAGNOSTICS_MAX_WAIT: Duration = Duration::from_secs(5);
/// Shortened idle window used after the no-op-edit nudge (spec §4.3).
pub const DIAGNOSTICS_NUDGE_IDLE_WINDOW: Duration = Duration::from_millis(300);
/// Shortened max wait used after the no-op-edit nudge (spec §4.3).
pub const DIAGNOSTICS_NUDGE_MAX_WAIT: Duration = Duration::from_secs(3);

/// Outcome of waiting for diagnostics to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsWaitResult {
    /// A new push arrived since the snapshot generation.
    Updated,
    /// No push arrived; the server has gone idle or silent.
    Idle,
    /// The connection died while waiting.
    ServerDied,
}

/// Manages communication with a single LSP server process.
pub struct LspClient {
    next_id: AtomicI64,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>,
    diagnostics: DiagnosticsCache,
    alive: Arc<AtomicBool>,
    encoding: PositionEncodingKind,
    /// Raw `initialize` response capabilities, kept for dotted-path lookup.
    capabilities: serde_json::Value,
    language: String,
    diagnostics_generation_counter: Arc<AtomicU64>,
    _reader_handle: tokio::task::JoinHandle<()>,
    _child: Child,
}

impl LspClient {
    /// Spawns the LSP server process and starts the response reader task.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or its stdio pipes
    /// cannot be captured.
    pub async fn spawn(command: &[String], language: &str) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("server command must have at least one element"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn language server: {program}"))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin not captured for {program}"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout not captured for {program}"))?;

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let diagnostics: DiagnosticsCache = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let diagnostics_generation_counter = Arc::new(AtomicU64::new(0));

        let reader_handle = tokio::spawn(Self::reader_task(
            stdin.clone(),
            stdout,
            pending.clone(),
            diagnostics.clone(),
            alive.clone(),
            diagnostics_generation_counter.clone(),
        ));

        Ok(Self {
            next_id: AtomicI64::new(1),
            stdin,
            pending,
            diagnostics,
            alive,
            encoding: PositionEncodingKind::UTF16,
            capabilities: serde_json::Value::Null,
            language: language.to_string(),
            diagnostics_generation_counter,
            _reader_handle: reader_handle,
            _child: child,
        })
    }

    /// Background task that reads LSP messages and routes responses to pending requests.
    async fn reader_task(
        stdin: Arc<Mutex<ChildStdin>>,
        stdout: ChildStdout,
        pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>,
        diagnostics: DiagnosticsCache,
        alive: Arc<AtomicBool>,
        generation_counter: Arc<AtomicU64>,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let mut temp = [0u8; 4096];
            match reader.read(&mut temp).await {
                Ok(0) => {
                    debug!("LSP stdout closed");
                    break;
                }
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
                Err(e) => {
                    error!("error reading from LSP stdout: {e}");
                    break;
                }
            }

            while let Ok(Some(message_str)) = protocol::try_parse_message(&mut buffer) {
                trace!("received LSP message: {message_str}");

                let value: serde_json::Value = match serde_json::from_str(&message_str) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("failed to parse JSON: {e}");
                        continue;
                    }
                };

                if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                    if let Some(id) = value.get("id") {
                        debug!("received server request: {method} (id: {id})");
                        let response = ResponseMessage {
                            jsonrpc: "2.0".to_string(),
                            id: Some(
                                serde_json::from_value(id.clone()).unwrap_or(RequestId::Number(0)),
                            ),
                            result: Some(serde_json::Value::Null),
                            error: None,
                        };
                        if let Ok(body) = serde_json::to_string(&response) {
                            let header = format!("Content-Length: {}\r\n\r\n", body.len());
                            let mut stdin_guard = stdin.lock().await;
                            if let Err(e) = stdin_guard.write_all(header.as_bytes()).await {
                                warn!("failed to write response header: {e}");
                            } else if let Err(e) = stdin_guard.write_all(body.as_bytes()).await {
                                warn!("failed to write response body: {e}");
                            } else if let Err(e) = stdin_guard.flush().await {
                                warn!("failed to flush response: {e}");
                            }
                        }
                    } else if let Ok(notification) =
                        serde_json::from_value::<NotificationMessage>(value)
                    {
                        Self::handle_notification(&notification, &diagnostics, &generation_counter)
                            .await;
                    }
                } else if value.get("id").is_some() {
                    if let Ok(response) = serde_json::from_value::<ResponseMessage>(value) {
                        if let Some(id) = &response.id {
                            let mut pending = pending.lock().await;
                            if let Some(sender) = pending.remove(id) {
                                let _ = sender.send(response);
                            } else {
                                warn!("received response for unknown request id: {id:?}");
                            }
                        }
                    }
                } else {
                    warn!("unknown message format: {message_str}");
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
        warn!("LSP reader task exiting — server connection lost");
    }

    async fn handle_notification(
        notification: &NotificationMessage,
        diagnostics: &DiagnosticsCache,
        generation_counter: &Arc<AtomicU64>,
    ) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                if let Ok(params) =
                    serde_json::from_value::<PublishDiagnosticsParams>(notification.params.clone())
                {
                    debug!(
                        count = params.diagnostics.len(),
                        uri = %params.uri.as_str(),
                        "received push diagnostics"
                    );
                    let generation = generation_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let mut cache = diagnostics.lock().await;
                    cache.insert(
                        params.uri,
                        DiagnosticsEntry {
                            diagnostics: params.diagnostics,
                            generation,
                            last_update: Some(Instant::now()),
                        },
                    );
                } else {
                    warn!("failed to parse publishDiagnostics params");
                }
            }
            "window/logMessage" | "window/showMessage" => {
                if let Some(message) = notification.params.get("message").and_then(|m| m.as_str())
                {
                    debug!("LSP server message: {message}");
                }
            }
            _ => {
                trace!(
                    method = %notification.method,
                    "ignoring notification"
                );
            }
        }
    }

    async fn request_with_timeout<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<R> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));

        let request = RequestMessage {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        self.send_message(&request).await?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(anyhow!("LSP server closed connection")),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                return Err(anyhow!(
                    "LSP request '{method}' timed out after {timeout:?}"
                ));
            }
        };

        if let Some(error) = response.error {
            return Err(anyhow!("LSP error {}: {}", error.code, error.message));
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).context("failed to parse LSP response")
    }

    async fn request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        self.request_with_timeout(method, params, INTERACTIVE_TIMEOUT)
            .await
    }

    async fn notify<P: serde::Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = NotificationMessage {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        self.send_message(&notification).await
    }

    async fn send_message<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        trace!("sending LSP message: {body}");

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(header.as_bytes()).await?;
        stdin.write_all(body.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Performs the LSP initialize handshake and caches the server's
    /// capabilities for later dotted-path lookup via [`Self::has_capability`].
    ///
    /// # Errors
    ///
    /// Returns an error if the `initialize` request fails or times out.
    pub async fn initialize(&mut self, roots: &[std::path::PathBuf]) -> Result<InitializeResult> {
        let workspace_folders = roots
            .iter()
            .filter_map(|root| {
                let uri: Uri = format!("file://{}", root.display()).parse().ok()?;
                Some(WorkspaceFolder {
                    uri,
                    name: root
                        .file_name()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "workspace".to_string()),
                })
            })
            .collect::<Vec<_>>();

        let root_uri = workspace_folders.first().map(|f| f.uri.clone());

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            capabilities: ClientCapabilities {
                general: Some(lsp_types::GeneralClientCapabilities {
                    position_encodings: Some(vec![
                        PositionEncodingKind::UTF8,
                        PositionEncodingKind::UTF16,
                    ]),
                    ..Default::default()
                }),
                workspace: Some(lsp_types::WorkspaceClientCapabilities {
                    workspace_folders: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            root_uri,
            workspace_folders: Some(workspace_folders),
            ..Default::default()
        };

        let result: InitializeResult = self.request("initialize", params).await?;

        self.encoding = result
            .capabilities
            .position_encoding
            .clone()
            .unwrap_or(PositionEncodingKind::UTF16);
        self.capabilities =
            serde_json::to_value(&result.capabilities).unwrap_or(serde_json::Value::Null);

        self.notify("initialized", InitializedParams {}).await?;

        Ok(result)
    }

    /// Walks the cached capability tree at a dotted path (spec §4.2
    /// `hasCapability`): a missing node is `false`, a boolean leaf is its
    /// value, any other leaf (object/array/string) means "provider present".
    #[must_use]
    pub fn has_capability(&self, dotted_path: &str) -> bool {
        let mut node = &self.capabilities;
        for segment in dotted_path.split('.') {
            match node.get(segment) {
                Some(next) => node = next,
                None => return false,
            }
        }
        match node {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// The language ID this client's server was spawned for.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Returns the negotiated position encoding.
    #[must_use]
    pub fn encoding(&self) -> PositionEncodingKind {
        self.encoding.clone()
    }

    /// Sends shutdown request and exit notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown request or exit notification fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _: serde_json::Value = self.request("shutdown", serde_json::Value::Null).await?;
        self.notify("exit", serde_json::Value::Null).await?;
        Ok(())
    }

    /// Notifies the server of a workspace folder change (spec §9 open
    /// question: explicit `didChangeWorkspaceFolders` instead of ad-hoc
    /// priming).
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be sent.
    pub async fn did_change_workspace_folders(
        &self,
        added: Vec<WorkspaceFolder>,
        removed: Vec<WorkspaceFolder>,
    ) -> Result<()> {
        self.notify(
            "workspace/didChangeWorkspaceFolders",
            DidChangeWorkspaceFoldersParams {
                event: WorkspaceFoldersChangeEvent { added, removed },
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the notification cannot be sent.
    pub async fn did_open(&self, params: DidOpenTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didOpen", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the notification cannot be sent.
    pub async fn did_change(&self, params: DidChangeTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didChange", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the notification cannot be sent.
    pub async fn did_close(&self, params: DidCloseTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didClose", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the notification cannot be sent.
    pub async fn did_save(&self, uri: Uri) -> Result<()> {
        self.notify(
            "textDocument/didSave",
            DidSaveTextDocumentParams {
                text_document: TextDocumentIdentifier { uri },
                text: None,
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.request_with_timeout("textDocument/hover", params, HOVER_TIMEOUT)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request("textDocument/definition", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn references(
        &self,
        params: ReferenceParams,
    ) -> Result<Option<Vec<lsp_types::Location>>> {
        self.request("textDocument/references", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn document_symbols(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        self.request("textDocument/documentSymbol", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn workspace_symbols(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<WorkspaceSymbolResponse>> {
        self.request("workspace/symbol", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn code_actions(
        &self,
        params: CodeActionParams,
    ) -> Result<Option<CodeActionResponse>> {
        self.request("textDocument/codeAction", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        self.request("textDocument/rename", params).await
    }

    /// Asks the server what import changes a rename would require (used by
    /// C9 to enumerate importers via the LSP rather than only via C7's
    /// static parse, when the server advertises `workspace.fileOperations`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn will_rename_files(&self, params: RenameFilesParams) -> Result<Option<WorkspaceEdit>> {
        self.request("workspace/willRenameFiles", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.request("textDocument/completion", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn signature_help(
        &self,
        params: SignatureHelpParams,
    ) -> Result<Option<SignatureHelp>> {
        self.request("textDocument/signatureHelp", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn formatting(
        &self,
        params: DocumentFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        self.request("textDocument/formatting", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        self.request("textDocument/rangeFormatting", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn prepare_call_hierarchy(
        &self,
        params: CallHierarchyPrepareParams,
    ) -> Result<Option<Vec<CallHierarchyItem>>> {
        self.request("textDocument/prepareCallHierarchy", params)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn incoming_calls(
        &self,
        params: CallHierarchyIncomingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
        self.request("callHierarchy/incomingCalls", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn outgoing_calls(
        &self,
        params: CallHierarchyOutgoingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
        self.request("callHierarchy/outgoingCalls", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn prepare_type_hierarchy(
        &self,
        params: TypeHierarchyPrepareParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("textDocument/prepareTypeHierarchy", params)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn supertypes(
        &self,
        params: TypeHierarchySupertypesParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("typeHierarchy/supertypes", params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or times out.
    pub async fn subtypes(
        &self,
        params: TypeHierarchySubtypesParams,
    ) -> Result<Option<Vec<TypeHierarchyItem>>> {
        self.request("typeHierarchy/subtypes", params).await
    }

    /// Pulls diagnostics via `textDocument/diagnostic` (tier 2 of spec
    /// §4.3). Returns `None` if the server doesn't support pull diagnostics
    /// or the report is `unchanged`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request itself fails (not if the server lacks
    /// the capability — callers should check `has_capability` first).
    pub async fn pull_diagnostics(&self, uri: Uri) -> Result<Option<Vec<Diagnostic>>> {
        let params = DocumentDiagnosticParams {
            text_document: TextDocumentIdentifier { uri },
            identifier: None,
            previous_result_id: None,
            work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            partial_result_params: lsp_types::PartialResultParams::default(),
        };
        let report: DocumentDiagnosticReport = self.request("textDocument/diagnostic", params).await?;
        match report {
            DocumentDiagnosticReport::Full(full) => {
                Ok(Some(full.full_document_diagnostic_report.items))
            }
            DocumentDiagnosticReport::Unchanged(_) => Ok(Some(Vec::new())),
        }
    }

    /// Returns the current diagnostics generation counter for `uri`, to be
    /// passed to [`Self::wait_for_diagnostics_update`] as a snapshot.
    pub async fn diagnostics_generation(&self, uri: &Uri) -> u64 {
        let cache = self.diagnostics.lock().await;
        cache.get(uri).map_or(0, |e| e.generation)
    }

    /// Tier-3 idle-convergence wait (spec §4.3): polls until either a push
    /// newer than `since_generation` arrives, or the cache has been idle for
    /// `idle_window`, or `max_wait` elapses.
    pub async fn wait_for_diagnostics_update(
        &self,
        uri: &Uri,
        since_generation: u64,
        idle_window: Duration,
        max_wait: Duration,
    ) -> DiagnosticsWaitResult {
        let deadline = Instant::now() + max_wait;
        let mut last_seen = since_generation;

        loop {
            if !self.is_alive() {
                return DiagnosticsWaitResult::ServerDied;
            }

            let (generation, last_update) = {
                let cache = self.diagnostics.lock().await;
                cache
                    .get(uri)
                    .map_or((0, None), |e| (e.generation, e.last_update))
            };

            if generation > last_seen {
                last_seen = generation;
                return DiagnosticsWaitResult::Updated;
            }

            let settled = last_update.is_none_or(|t| t.elapsed() >= idle_window);
            if settled || Instant::now() >= deadline {
                return DiagnosticsWaitResult::Idle;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Gets cached push diagnostics for a specific URI (tier 1 of spec
    /// §4.3).
    pub async fn get_diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
        let cache = self.diagnostics.lock().await;
        cache.get(uri).map(|e| e.diagnostics.clone()).unwrap_or_default()
    }

    /// Returns true if the LSP server connection is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_lookup_missing_node_is_false() {
        let client_caps = serde_json::json!({ "renameProvider": true });
        assert!(walk_capability(&client_caps, "renameProvider"));
        assert!(!walk_capability(&client_caps, "completionProvider"));
    }

    #[test]
    fn capability_lookup_object_leaf_is_true() {
        let caps = serde_json::json!({ "completionProvider": { "triggerCharacters": ["."] } });
        assert!(walk_capability(&caps, "completionProvider"));
    }

    #[test]
    fn capability_lookup_dotted_path() {
        let caps = serde_json::json!({ "workspace": { "fileOperations": { "willRename": true } } });
        assert!(walk_capability(&caps, "workspace.fileOperations.willRename"));
    }

    fn walk_capability(caps: &serde_json::Value, dotted: &str) -> bool {
        let mut node = caps;
        for seg in dotted.split('.') {
            match node.get(seg) {
                Some(n) => node = n,
                None => return false,
            }
        }
        match node {
            serde_json::Value::Null => false,
            serde_json::Value::Bool(b) => *b,
            _ => true,
        }
    }
}
