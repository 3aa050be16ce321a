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

//! Warpline is a bridge between MCP (Model Context Protocol) and LSP
//! (Language Server Protocol).
//!
//! It multiplexes a fleet of language servers behind a uniform set of MCP
//! tools: symbol lookup, atomic cross-file rename, import-preserving file
//! moves, diagnostics, and batch refactoring workflows.

/// MCP tool handlers wired to the LSP bridge and supporting services.
pub mod bridge;
/// Command-line interface definitions and utilities.
pub mod cli;
/// Configuration handling for language servers and session settings.
pub mod config;
/// Edit engine: atomic multi-file `WorkspaceEdit` application (C6).
pub mod edit;
/// Crate-wide error taxonomy shared by every tool handler (§7).
pub mod error;
/// Per-language import graph extraction and rewriting (C7, C8).
pub mod import;
/// LSP client implementation and server management (C2, C3, C4).
pub mod lsp;
/// MCP server implementation and type definitions (C2, C11).
pub mod mcp;
/// Canonical path/URI conversion and LSP position mapping (C1).
pub mod path_utils;
/// Cross-language file-move orchestrator and dead-code analysis (C9).
pub mod refactor;
/// Tool registry, service context, and dispatch (C11).
pub mod registry;
/// Session management and event broadcasting.
pub mod session;
/// Symbol lookup, rename, and multi-position resolution (C5).
pub mod symbol;
/// The MCP tool surface: argument parsing and registry wiring (C11).
pub mod tools;
/// Batch and workflow execution across multiple tool calls (C10).
pub mod workflow;
