// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Bridges the synchronous [`ToolHandler`] trait MCP needs onto the async
//! [`ToolRegistry`] (C11).
//!
//! [`McpServer`](crate::mcp::McpServer) runs `list_tools`/`call_tool` on a
//! synchronous stdio loop; everything the registry dispatches to is async.
//! [`LspBridgeHandler`] holds a [`tokio::runtime::Handle`] to the runtime
//! that owns the LSP connections and drives each call through
//! `Handle::block_on`, exactly as the bridge has always crossed this
//! boundary.

use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

use crate::mcp::{CallToolResult, Tool, ToolHandler};
use crate::registry::{ServiceContext, ToolRegistry};
use crate::session::{EventBroadcaster, EventKind};

/// Adapts an async [`ToolRegistry`] to MCP's synchronous [`ToolHandler`].
pub struct LspBridgeHandler {
    registry: Arc<ToolRegistry>,
    context: Arc<ServiceContext>,
    runtime: Handle,
    broadcaster: EventBroadcaster,
}

impl LspBridgeHandler {
    /// Creates a new handler dispatching onto `registry`.
    pub const fn new(
        registry: Arc<ToolRegistry>,
        context: Arc<ServiceContext>,
        runtime: Handle,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            registry,
            context,
            runtime,
            broadcaster,
        }
    }

    fn extract_file_path(arguments: Option<&serde_json::Value>) -> Option<String> {
        arguments
            .and_then(|v| v.get("file_path"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

impl ToolHandler for LspBridgeHandler {
    fn list_tools(&self) -> Vec<Tool> {
        self.registry
            .definitions()
            .map(|def| Tool {
                name: def.name().to_string(),
                description: Some(def.description().to_string()),
                input_schema: def.input_schema().clone(),
            })
            .collect()
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        let start = Instant::now();
        let file = Self::extract_file_path(arguments.as_ref());

        self.broadcaster.send(EventKind::ToolCall {
            tool: name.to_string(),
            file,
        });

        let broadcast_result = |success: bool| {
            self.broadcaster.send(EventKind::ToolResult {
                tool: name.to_string(),
                success,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        };

        let args = arguments.unwrap_or(serde_json::Value::Null);
        let dispatch = self
            .registry
            .dispatch(self.context.clone(), name, args);
        let result = self.runtime.block_on(dispatch);

        match result {
            Ok(value) => {
                broadcast_result(true);
                Ok(CallToolResult::text(
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                ))
            }
            Err(err) => {
                broadcast_result(false);
                if let Some(remediation) = err.remediation() {
                    Err(anyhow!("{err}\n\n{remediation}"))
                } else {
                    Err(anyhow!(err))
                }
            }
        }
    }
}
