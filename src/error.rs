// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Crate-wide error taxonomy for the MCP tool boundary.
//!
//! Internal plumbing (LSP calls, filesystem I/O, JSON parsing) returns
//! `anyhow::Result` throughout the bridge, matching the LSP client and
//! document manager. This module exists only for the errors that cross the
//! MCP boundary and must be distinguishable by *kind*, each with a
//! remediation hint a caller can act on.

use thiserror::Error;

/// The error taxonomy a tool handler may surface to an MCP client.
///
/// Variant names are the taxonomy, not wire-level type names; they are
/// serialized as their `Display` string plus a `remediation()` hint.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed path, empty symbol name, or unknown symbol kind.
    #[error("validation error: {0}")]
    Validation(String),

    /// No configured server covers this file extension.
    #[error("no language server configured for extension `{extension}`")]
    NoServerForExtension {
        /// The lowercase, dot-less extension that had no match.
        extension: String,
    },

    /// The concurrency cap on live servers has been reached.
    #[error("at capacity: {active}/{cap} language servers already running")]
    AtCapacity {
        /// Number of currently active servers.
        active: usize,
        /// Configured concurrency cap.
        cap: usize,
    },

    /// The server process exited unexpectedly.
    #[error("language server for `{server_key}` crashed")]
    ServerCrashed {
        /// The server's config-derived key.
        server_key: String,
    },

    /// The server was restarted while a request was in flight.
    #[error("language server for `{server_key}` was restarted")]
    ServerRestarted {
        /// The server's config-derived key.
        server_key: String,
    },

    /// The transport closed while requests were pending.
    #[error("connection lost to language server for `{server_key}`")]
    ConnectionLost {
        /// The server's config-derived key.
        server_key: String,
    },

    /// A request's deadline elapsed before a response arrived.
    #[error("request `{method}` timed out after {elapsed_ms} ms")]
    Timeout {
        /// The LSP method that timed out.
        method: String,
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// The operation requires a capability the server did not advertise.
    #[error("server `{server_key}` does not advertise capability `{capability}`")]
    CapabilityUnsupported {
        /// The server's config-derived key.
        server_key: String,
        /// Dotted capability path that was missing, e.g. `renameProvider`.
        capability: String,
    },

    /// Two edits within the same file overlap.
    #[error("overlapping edits in `{uri}`")]
    OverlappingEdits {
        /// The URI whose edits overlapped.
        uri: String,
    },

    /// An edit range falls outside the current file's extent.
    #[error("edit range out of bounds in `{uri}`")]
    RangeOutOfBounds {
        /// The URI whose edit range was invalid.
        uri: String,
    },

    /// Two `applyWorkspaceEdit` calls touched overlapping files concurrently.
    #[error("concurrent edit conflict on `{uri}`")]
    ConcurrentEdit {
        /// The URI that was already being edited.
        uri: String,
    },

    /// A file move would place a file into an ancestor of one of its importers.
    #[error("move would create an import cycle: {detail}")]
    WouldCreateCycle {
        /// Human-readable explanation naming the offending importer.
        detail: String,
    },

    /// A delete/move would break imports and `force` was not set.
    #[error("{importer_count} importer(s) would break; pass force=true to proceed")]
    ImporterConflict {
        /// Number of importers that would be broken.
        importer_count: usize,
        /// Paths of the affected importers (truncated for display elsewhere).
        importers: Vec<String>,
    },

    /// The dispatcher received a tool name with no registered handler.
    #[error("unknown tool `{0}`")]
    ToolUnknown(String),

    /// An unexpected internal failure (wraps any `anyhow::Error`).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    /// Returns a short remediation hint to accompany the error message.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Validation(_) => Some("check the tool's argument schema and retry"),
            Self::NoServerForExtension { .. } => {
                Some("add a server entry covering this extension in .warpline/config.json")
            }
            Self::AtCapacity { .. } => {
                Some("restart an idle server with restart_server or wait for one to free up")
            }
            Self::ServerCrashed { .. } => Some("the next request will spawn a fresh instance"),
            Self::ServerRestarted { .. } => Some("retry the request; the server is back up"),
            Self::ConnectionLost { .. } => Some("retry the request once; a fresh instance will spawn"),
            Self::Timeout { .. } => Some("retry with a larger timeout or check server health"),
            Self::CapabilityUnsupported { .. } => {
                Some("this server does not support the operation; try a different tool")
            }
            Self::OverlappingEdits { .. } | Self::RangeOutOfBounds { .. } => {
                Some("the edit was not applied; recompute the edit against current file content")
            }
            Self::ConcurrentEdit { .. } => Some("retry after the in-flight edit completes"),
            Self::WouldCreateCycle { .. } => {
                Some("choose a destination that is not an ancestor of an importer")
            }
            Self::ImporterConflict { .. } => Some("pass force=true to proceed anyway"),
            Self::ToolUnknown(_) => Some("call tools/list to see the available tool names"),
            Self::Internal(_) => None,
        }
    }

    /// Returns `true` for errors the supervisor should retry once against a
    /// fresh server instance before surfacing (§7 propagation policy).
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_are_retried() {
        let e = BridgeError::ConnectionLost {
            server_key: "k".to_string(),
        };
        assert!(e.is_infrastructure());
        let e = BridgeError::Timeout {
            method: "m".to_string(),
            elapsed_ms: 10,
        };
        assert!(e.is_infrastructure());
    }

    #[test]
    fn semantic_errors_are_not_retried() {
        let e = BridgeError::Validation("bad".to_string());
        assert!(!e.is_infrastructure());
    }

    #[test]
    fn every_variant_but_internal_has_remediation() {
        let e = BridgeError::ToolUnknown("foo".to_string());
        assert!(e.remediation().is_some());
        let e = BridgeError::Internal(anyhow::anyhow!("boom"));
        assert!(e.remediation().is_none());
    }
}
