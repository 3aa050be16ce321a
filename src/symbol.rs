// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Symbol lookup, navigation, and rename (C5).
//!
//! Wraps a [`ClientManager`] and [`DocumentManager`] with the "ensure the
//! file is open, then ask its server" pattern every symbol operation
//! shares, plus the ±1 position retry narrowly scoped to rename (spec §9
//! open question #2).

use crate::bridge::{DocumentManager, DocumentNotification};
use crate::error::BridgeError;
use crate::lsp::{ClientManager, LspClient, ServerState};
use crate::path_utils::{HumanPosition, language_id_for_path, path_to_uri, uri_to_path};
use lsp_types::{
    CallHierarchyIncomingCall, CallHierarchyIncomingCallsParams, CallHierarchyItem,
    CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams,
    CompletionParams, CompletionResponse, DocumentSymbolParams, DocumentSymbolResponse,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams, Location, Position, Range,
    ReferenceContext, ReferenceParams, RenameParams, SignatureHelp, SignatureHelpParams,
    SymbolKind, TextDocumentIdentifier, TextDocumentPositionParams, Uri, WorkDoneProgressParams,
    WorkspaceEdit, WorkspaceSymbolParams, WorkspaceSymbolResponse,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A single name/kind match produced by [`SymbolService::find_symbol_matches`].
#[derive(Debug, Clone)]
pub struct SymbolMatch {
    /// The symbol's name (echoed back for disambiguation by callers).
    pub name: String,
    /// The symbol's declared kind.
    pub kind: SymbolKind,
    /// The symbol's full range.
    pub range: Range,
    /// The range that should be used as the rename/navigation anchor
    /// (`selectionRange` for hierarchical symbols, a name-offset-refined
    /// single point for flat `SymbolInformation`).
    pub selection_range: Range,
}

/// The outcome of [`SymbolService::find_symbol_matches`]: the matches found,
/// plus a warning when a `kind` filter had to be dropped to find anything
/// (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct SymbolMatchResult {
    /// Every match found, in document order.
    pub matches: Vec<SymbolMatch>,
    /// Set when `kind` was supplied but no symbol matched it, so the
    /// search was retried across all kinds.
    pub warning: Option<String>,
}

/// Parses a human-supplied symbol kind name (case-insensitive) into the LSP
/// `SymbolKind` enum (spec §3 names the 26-value LSP kind enum).
#[must_use]
pub fn parse_symbol_kind(name: &str) -> Option<SymbolKind> {
    Some(match name.to_ascii_lowercase().as_str() {
        "file" => SymbolKind::FILE,
        "module" => SymbolKind::MODULE,
        "namespace" => SymbolKind::NAMESPACE,
        "package" => SymbolKind::PACKAGE,
        "class" => SymbolKind::CLASS,
        "method" => SymbolKind::METHOD,
        "property" => SymbolKind::PROPERTY,
        "field" => SymbolKind::FIELD,
        "constructor" => SymbolKind::CONSTRUCTOR,
        "enum" => SymbolKind::ENUM,
        "interface" => SymbolKind::INTERFACE,
        "function" => SymbolKind::FUNCTION,
        "variable" => SymbolKind::VARIABLE,
        "constant" => SymbolKind::CONSTANT,
        "string" => SymbolKind::STRING,
        "number" => SymbolKind::NUMBER,
        "boolean" => SymbolKind::BOOLEAN,
        "array" => SymbolKind::ARRAY,
        "object" => SymbolKind::OBJECT,
        "key" => SymbolKind::KEY,
        "null" => SymbolKind::NULL,
        "enummember" | "enum_member" => SymbolKind::ENUM_MEMBER,
        "struct" => SymbolKind::STRUCT,
        "event" => SymbolKind::EVENT,
        "operator" => SymbolKind::OPERATOR,
        "typeparameter" | "type_parameter" => SymbolKind::TYPE_PARAMETER,
        _ => return None,
    })
}

/// Flattens a [`DocumentSymbolResponse`] (either hierarchical
/// `DocumentSymbol[]` or flat `SymbolInformation[]`) into a single list of
/// `(name, kind, range, selectionRange)` tuples, recursing into children
/// for the hierarchical shape (spec §4.4, §3 "the service must handle both
/// shapes transparently").
fn flatten_symbols(response: &DocumentSymbolResponse) -> Vec<(String, SymbolKind, Range, Range)> {
    fn walk_nested(symbol: &lsp_types::DocumentSymbol, out: &mut Vec<(String, SymbolKind, Range, Range)>) {
        out.push((
            symbol.name.clone(),
            symbol.kind,
            symbol.range,
            symbol.selection_range,
        ));
        if let Some(children) = &symbol.children {
            for child in children {
                walk_nested(child, out);
            }
        }
    }

    let mut out = Vec::new();
    match response {
        DocumentSymbolResponse::Flat(flat) => {
            for symbol in flat {
                out.push((symbol.name.clone(), symbol.kind, symbol.location.range, symbol.location.range));
            }
        }
        DocumentSymbolResponse::Nested(nested) => {
            for symbol in nested {
                walk_nested(symbol, &mut out);
            }
        }
    }
    out
}

/// Refines a flat `SymbolInformation`'s single-point range by scanning the
/// source line for the name's byte offset (spec §4.4: "For flat results,
/// refine the character position by scanning the source line for the
/// name's offset").
fn refine_flat_position(source: &str, name: &str, range: Range) -> Range {
    let Some(line) = source.lines().nth(range.start.line as usize) else {
        return range;
    };
    let Some(byte_offset) = line.find(name) else {
        return range;
    };
    let character = line[..byte_offset].chars().count() as u32;
    let start = Position {
        line: range.start.line,
        character,
    };
    let end = Position {
        line: range.start.line,
        character: character + name.chars().count() as u32,
    };
    Range { start, end }
}

/// Service context shared by every symbol operation: the server fleet and
/// the document sync cache.
pub struct SymbolService {
    servers: Arc<ClientManager>,
    documents: tokio::sync::Mutex<DocumentManager>,
}

impl SymbolService {
    /// Creates a new service over a shared server supervisor.
    #[must_use]
    pub fn new(servers: Arc<ClientManager>) -> Self {
        Self {
            servers,
            documents: tokio::sync::Mutex::new(DocumentManager::new()),
        }
    }

    /// Ensures `path` is open on its owning server and returns the server
    /// plus the document's current URI.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NoServerForExtension`] if no server covers
    /// the file's extension, [`BridgeError::AtCapacity`] if spawning one
    /// would exceed the concurrency cap, or a wrapped I/O error if the file
    /// cannot be read.
    pub async fn ensure_open(&self, path: &Path) -> Result<(Uri, Arc<ServerState>), BridgeError> {
        let extension = crate::path_utils::extension_of(path).unwrap_or_default();
        let server = self.servers.get_or_spawn(&extension).await?;

        let client = server
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| BridgeError::ServerCrashed {
                server_key: server.key.clone(),
            })?;

        let notification = {
            let mut docs = self.documents.lock().await;
            docs.ensure_open(path)
                .await
                .map_err(BridgeError::Internal)?
        };

        if let Some(notification) = notification {
            match notification {
                DocumentNotification::Open(params) => {
                    client.did_open(params).await.map_err(BridgeError::Internal)?;
                }
                DocumentNotification::Change(params) => {
                    client
                        .did_change(params)
                        .await
                        .map_err(BridgeError::Internal)?;
                }
            }
        }

        let uri = path_to_uri(path).map_err(BridgeError::Internal)?;
        Ok((uri, server))
    }

    /// Returns the live client serving `path`'s extension, opening the file
    /// on it first if necessary. Exposed at `pub(crate)` so [`crate::refactor`]
    /// can reuse the same server routing for import-rewrite lookups.
    pub(crate) async fn client_for(&self, path: &Path) -> Result<Arc<LspClient>, BridgeError> {
        let (_, server) = self.ensure_open(path).await?;
        server
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| BridgeError::ServerCrashed {
                server_key: server.key.clone(),
            })
    }

    /// `textDocument/documentSymbol` (spec §6 `get_document_symbols`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn document_symbols(
        &self,
        path: &Path,
    ) -> Result<Option<DocumentSymbolResponse>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "documentSymbolProvider")?;
        client
            .document_symbols(DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `findSymbolMatches(file, name, kind?)` (spec §4.4): locates every
    /// symbol in `path` with an exact name match and, if `kind` is given,
    /// an exact kind match. If `kind` filters out every candidate, retries
    /// without it and reports a warning rather than returning nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the
    /// `documentSymbol` request fails, or (for flat results) the file's
    /// contents cannot be read to refine the match's column.
    pub async fn find_symbol_matches(
        &self,
        path: &Path,
        name: &str,
        kind: Option<SymbolKind>,
    ) -> Result<SymbolMatchResult, BridgeError> {
        let response = self.document_symbols(path).await?;
        let Some(response) = response else {
            return Ok(SymbolMatchResult::default());
        };

        let is_flat = matches!(response, DocumentSymbolResponse::Flat(_));
        let flattened = flatten_symbols(&response);

        let source = if is_flat {
            Some(
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| BridgeError::Internal(e.into()))?,
            )
        } else {
            None
        };

        let build = |candidates: &[(String, SymbolKind, Range, Range)]| -> Vec<SymbolMatch> {
            candidates
                .iter()
                .filter(|(candidate_name, ..)| candidate_name == name)
                .map(|(candidate_name, candidate_kind, range, selection_range)| {
                    let selection_range = match &source {
                        Some(text) => refine_flat_position(text, candidate_name, *selection_range),
                        None => *selection_range,
                    };
                    SymbolMatch {
                        name: candidate_name.clone(),
                        kind: *candidate_kind,
                        range: *range,
                        selection_range,
                    }
                })
                .collect()
        };

        if let Some(kind) = kind {
            let filtered: Vec<_> = flattened
                .iter()
                .filter(|(_, candidate_kind, ..)| *candidate_kind == kind)
                .cloned()
                .collect();
            let matches = build(&filtered);
            if !matches.is_empty() {
                return Ok(SymbolMatchResult {
                    matches,
                    warning: None,
                });
            }

            let matches = build(&flattened);
            if matches.is_empty() {
                return Ok(SymbolMatchResult::default());
            }
            return Ok(SymbolMatchResult {
                matches,
                warning: Some(
                    "requested kind not found; showing all matches".to_string(),
                ),
            });
        }

        Ok(SymbolMatchResult {
            matches: build(&flattened),
            warning: None,
        })
    }

    /// `workspace/symbol` across every currently live server (spec §6
    /// `search_workspace_symbols`). Servers with no matches contribute
    /// nothing; a server error is skipped rather than failing the whole
    /// search.
    pub async fn workspace_symbols(&self, query: &str) -> Vec<WorkspaceSymbolResponse> {
        let mut results = Vec::new();
        for server in self.servers.active_servers().await {
            let Some(client) = server.client.lock().await.clone() else {
                continue;
            };
            if !client.has_capability("workspaceSymbolProvider") {
                continue;
            }
            let params = WorkspaceSymbolParams {
                query: query.to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            if let Ok(Some(response)) = client.workspace_symbols(params).await {
                results.push(response);
            }
        }
        results
    }

    /// `textDocument/definition` (spec §6 `find_definition`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn find_definition(
        &self,
        path: &Path,
        position: HumanPosition,
    ) -> Result<Option<GotoDefinitionResponse>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "definitionProvider")?;
        client
            .definition(GotoDefinitionParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `textDocument/references` (spec §6 `find_references`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn find_references(
        &self,
        path: &Path,
        position: HumanPosition,
        include_declaration: bool,
    ) -> Result<Option<Vec<Location>>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "referencesProvider")?;
        client
            .references(ReferenceParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
                context: ReferenceContext {
                    include_declaration,
                },
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `textDocument/hover` (spec §6 `get_hover`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn hover(
        &self,
        path: &Path,
        position: HumanPosition,
    ) -> Result<Option<Hover>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "hoverProvider")?;
        client
            .hover(HoverParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `textDocument/completion` (spec §6 `get_completions`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn completion(
        &self,
        path: &Path,
        position: HumanPosition,
        trigger_character: Option<String>,
    ) -> Result<Option<CompletionResponse>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "completionProvider")?;
        let context = trigger_character.map(|trigger_character| lsp_types::CompletionContext {
            trigger_kind: lsp_types::CompletionTriggerKind::TRIGGER_CHARACTER,
            trigger_character: Some(trigger_character),
        });
        client
            .completion(CompletionParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
                context,
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `textDocument/signatureHelp` (spec §6 `get_signature_help`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn signature_help(
        &self,
        path: &Path,
        position: HumanPosition,
        trigger_character: Option<String>,
    ) -> Result<Option<SignatureHelp>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "signatureHelpProvider")?;
        let context = trigger_character.map(|trigger_character| lsp_types::SignatureHelpContext {
            trigger_kind: lsp_types::SignatureHelpTriggerKind::TRIGGER_CHARACTER,
            trigger_character: Some(trigger_character),
            is_retrigger: false,
            active_signature_help: None,
        });
        client
            .signature_help(SignatureHelpParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                context,
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `textDocument/rename`: returns the proposed edit without applying it
    /// (spec §6 `rename_symbol`, always a dry run — the caller decides
    /// whether to commit via [`crate::edit::apply_atomic`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn rename_symbol(
        &self,
        path: &Path,
        position: HumanPosition,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "renameProvider")?;
        client
            .rename(RenameParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                new_name: new_name.to_string(),
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `rename_symbol_strict` (spec §6): like [`Self::rename_symbol`], but
    /// retries at each of the four adjacent columns (±1 character, ±1
    /// line) if the exact position yields nothing, since a human-reported
    /// column is frequently off by one relative to where the server
    /// expects the cursor to land inside the identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or every attempt's
    /// request fails outright (as opposed to succeeding with `None`).
    pub async fn rename_symbol_strict(
        &self,
        path: &Path,
        position: HumanPosition,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, BridgeError> {
        if let Some(edit) = self.rename_symbol(path, position, new_name).await? {
            return Ok(Some(edit));
        }

        let candidates = [
            (position.line, position.character.saturating_add(1)),
            (position.line, position.character.saturating_sub(1)),
            (position.line.saturating_add(1), position.character),
            (position.line.saturating_sub(1), position.character),
        ];

        for (line, character) in candidates {
            if (line, character) == (position.line, position.character) {
                continue;
            }
            debug!(line, character, "rename_symbol_strict retrying at adjacent position");
            let retry = HumanPosition { line, character };
            if let Some(edit) = self.rename_symbol(path, retry, new_name).await? {
                return Ok(Some(edit));
            }
        }

        Ok(None)
    }

    /// `textDocument/prepareCallHierarchy` (spec §6 `prepare_call_hierarchy`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the request fails.
    pub async fn prepare_call_hierarchy(
        &self,
        path: &Path,
        position: HumanPosition,
    ) -> Result<Option<Vec<CallHierarchyItem>>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;
        Self::require_capability(&server, &client, "callHierarchyProvider")?;
        client
            .prepare_call_hierarchy(CallHierarchyPrepareParams {
                text_document_position_params: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri },
                    position: position.to_lsp(),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `callHierarchy/incomingCalls` (spec §6
    /// `get_call_hierarchy_incoming_calls`). Routes to the server owning
    /// `item`'s own URI rather than the caller's current file.
    ///
    /// # Errors
    ///
    /// Returns an error if `item`'s URI cannot be resolved to a path, no
    /// server covers its extension, or the request fails.
    pub async fn call_hierarchy_incoming_calls(
        &self,
        item: CallHierarchyItem,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>, BridgeError> {
        let path = uri_to_path(&item.uri).map_err(BridgeError::Internal)?;
        let client = self.client_for(&path).await?;
        client
            .incoming_calls(CallHierarchyIncomingCallsParams {
                item,
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    /// `callHierarchy/outgoingCalls` (spec §6
    /// `get_call_hierarchy_outgoing_calls`).
    ///
    /// # Errors
    ///
    /// Returns an error if `item`'s URI cannot be resolved to a path, no
    /// server covers its extension, or the request fails.
    pub async fn call_hierarchy_outgoing_calls(
        &self,
        item: CallHierarchyItem,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>, BridgeError> {
        let path = uri_to_path(&item.uri).map_err(BridgeError::Internal)?;
        let client = self.client_for(&path).await?;
        client
            .outgoing_calls(CallHierarchyOutgoingCallsParams {
                item,
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            })
            .await
            .map_err(BridgeError::Internal)
    }

    async fn required_client(&self, server: &ServerState) -> Result<Arc<LspClient>, BridgeError> {
        server
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| BridgeError::ServerCrashed {
                server_key: server.key.clone(),
            })
    }

    /// Gates an operation on the owning server advertising `capability`
    /// (spec §7, §8 P10: "a tool whose required capability is absent fails
    /// with `CapabilityUnsupported` and does not send any request"). Called
    /// before every request-issuing method below, never after.
    fn require_capability(
        server: &ServerState,
        client: &LspClient,
        capability: &str,
    ) -> Result<(), BridgeError> {
        if client.has_capability(capability) {
            Ok(())
        } else {
            Err(BridgeError::CapabilityUnsupported {
                server_key: server.key.clone(),
                capability: capability.to_string(),
            })
        }
    }

    /// Three-tier diagnostics retrieval (spec §4.3): cached push first, then
    /// a pull request if the server advertises `diagnosticProvider`, then an
    /// idle-convergence wait with a no-op-edit nudge as a last resort.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn get_diagnostics(
        &self,
        path: &Path,
        wait_for_fresh: bool,
    ) -> Result<Vec<lsp_types::Diagnostic>, BridgeError> {
        let (uri, server) = self.ensure_open(path).await?;
        let client = self.required_client(&server).await?;

        let cached = client.get_diagnostics(&uri).await;
        if !cached.is_empty() || !wait_for_fresh {
            return Ok(cached);
        }

        if client.has_capability("diagnosticProvider") {
            if let Ok(Some(pulled)) = client.pull_diagnostics(uri.clone()).await {
                return Ok(pulled);
            }
        }

        let generation = client.diagnostics_generation(&uri).await;
        let result = client
            .wait_for_diagnostics_update(
                &uri,
                generation,
                crate::lsp::DIAGNOSTICS_IDLE_WINDOW,
                crate::lsp::DIAGNOSTICS_MAX_WAIT,
            )
            .await;

        if result == crate::lsp::DiagnosticsWaitResult::Idle {
            let nudge = {
                let mut docs = self.documents.lock().await;
                docs.nudge_reanalysis(path).map_err(BridgeError::Internal)?
            };
            if let Some((append, revert)) = nudge {
                let _ = client.did_change(append).await;
                let _ = client.did_change(revert).await;
            }
            let _ = client
                .wait_for_diagnostics_update(
                    &uri,
                    generation,
                    crate::lsp::DIAGNOSTICS_NUDGE_IDLE_WINDOW,
                    crate::lsp::DIAGNOSTICS_NUDGE_MAX_WAIT,
                )
                .await;
        }

        Ok(client.get_diagnostics(&uri).await)
    }

    /// Returns the language ID `path` would be opened with.
    #[must_use]
    pub fn language_id_for_path(path: &Path) -> &'static str {
        language_id_for_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_candidates_skip_the_original_position() {
        let position = HumanPosition {
            line: 5,
            character: 3,
        };
        let candidates = [
            (position.line, position.character.saturating_add(1)),
            (position.line, position.character.saturating_sub(1)),
            (position.line.saturating_add(1), position.character),
            (position.line.saturating_sub(1), position.character),
        ];
        assert!(candidates.iter().all(|c| *c != (position.line, position.character)));
    }
}
