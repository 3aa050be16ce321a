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

/// Low-level LSP client for communicating with a server process.
pub mod client;
/// High-level manager for lazy-spawning and caching LSP clients (C3 supervisor).
pub mod manager;
/// LSP message protocol definitions.
pub mod protocol;
/// Server lifecycle and progress tracking.
pub mod state;

pub use client::{
    DIAGNOSTICS_IDLE_WINDOW, DIAGNOSTICS_MAX_WAIT, DIAGNOSTICS_NUDGE_IDLE_WINDOW,
    DIAGNOSTICS_NUDGE_MAX_WAIT, DIAGNOSTICS_TIMEOUT, DiagnosticsWaitResult, HOVER_TIMEOUT,
    INTERACTIVE_TIMEOUT, LspClient,
};
pub use manager::{ClientManager, ServerState};
pub use state::{ProgressTracker, ServerLifecycle, ServerStatus};
