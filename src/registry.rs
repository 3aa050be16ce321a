// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Tool registry and dispatch (C11).
//!
//! Replaces the "dynamic registry via module side-effects" pattern (spec
//! §9 redesign flag) with an explicit builder: every tool is registered by
//! name at startup, tagged with the service it requires, and the builder
//! rejects duplicate names outright rather than letting a later
//! registration silently shadow an earlier one.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::bridge::PathValidator;
use crate::error::BridgeError;
use crate::refactor::RefactorService;
use crate::symbol::SymbolService;

/// The service tag a handler declares it needs from the [`ServiceContext`]
/// (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredService {
    /// Needs [`ServiceContext::symbols`].
    Symbol,
    /// Needs raw filesystem access beyond what a server request provides.
    File,
    /// Needs [`ServiceContext::symbols`] for diagnostics specifically.
    Diagnostic,
    /// Needs [`ServiceContext::refactor`] (file moves, dead code).
    Intelligence,
    /// Needs [`ServiceContext::symbols`] for call-hierarchy operations.
    Hierarchy,
    /// Needs [`ServiceContext::servers`] directly (e.g. `restart_server`).
    Lsp,
    /// Needs the whole [`ServiceContext`] (e.g. `batch_execute`).
    ServiceContext,
    /// Needs nothing beyond its own arguments.
    None,
}

/// The injected dependencies every tool handler is dispatched against.
/// Threaded through by value (as an `Arc`) rather than held in any
/// process-wide singleton, so tests can construct a fresh one per case
/// (spec §9 redesign flag on process-wide singletons).
pub struct ServiceContext {
    /// Symbol lookup, navigation, and rename (C5).
    pub symbols: Arc<SymbolService>,
    /// Cross-language file-move orchestration and dead-code analysis (C9).
    pub refactor: Arc<RefactorService>,
    /// The underlying server supervisor, for tools that manage servers
    /// directly rather than through C5/C9.
    pub servers: Arc<crate::lsp::ClientManager>,
    /// Workspace-root and protected-config enforcement for tools that touch
    /// the filesystem directly (`create_file`, `delete_file`).
    pub validator: Arc<PathValidator>,
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, BridgeError>> + Send>>;
type ToolFn = Arc<dyn Fn(Arc<ServiceContext>, Value) -> ToolFuture + Send + Sync>;

/// A single registered tool: its name, the service it requires, its JSON
/// argument schema, and its handler closure.
#[derive(Clone)]
pub struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    required_service: RequiredService,
    input_schema: Value,
    handler: ToolFn,
}

impl ToolDefinition {
    /// Declares a new tool. `handler` receives the dispatch-time service
    /// context and raw JSON arguments, and returns the tool's JSON result.
    pub fn new<F, Fut>(
        name: &'static str,
        description: &'static str,
        required_service: RequiredService,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<ServiceContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BridgeError>> + Send + 'static,
    {
        Self {
            name,
            description,
            required_service,
            input_schema,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }

    /// The tool's canonical name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// A one-line description, surfaced in `tools/list`.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.description
    }

    /// The service this tool requires from a [`ServiceContext`].
    #[must_use]
    pub const fn required_service(&self) -> RequiredService {
        self.required_service
    }

    /// The tool's JSON Schema for its `arguments` object.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Builds a [`ToolRegistry`] by explicit enumeration, rejecting duplicate
/// tool names (spec §9 redesign flag replacing the dynamic/side-effect
/// registry).
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool with the same name is already
    /// registered.
    pub fn register(mut self, def: ToolDefinition) -> anyhow::Result<Self> {
        if self.tools.contains_key(def.name) {
            anyhow::bail!("duplicate tool registration: {}", def.name);
        }
        self.tools.insert(def.name.to_string(), def);
        Ok(self)
    }

    /// Finalizes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// The process-wide (but injectable, test-fresh) mapping from tool name to
/// handler.
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Lists every registered tool's definition, for `tools/list`.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    /// Looks up a tool's required service without invoking it.
    #[must_use]
    pub fn required_service(&self, name: &str) -> Option<RequiredService> {
        self.tools.get(name).map(ToolDefinition::required_service)
    }

    /// Invokes `name` with `arguments` against `context`, wrapping the
    /// result or error in the uniform `{content: [{type: "text", text}]}`
    /// envelope (spec §4.9).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ToolUnknown`] if no tool is registered under
    /// `name`, or whatever error the handler itself produces.
    pub async fn dispatch(
        &self,
        context: Arc<ServiceContext>,
        name: &str,
        arguments: Value,
    ) -> Result<Value, BridgeError> {
        let def = self
            .tools
            .get(name)
            .ok_or_else(|| BridgeError::ToolUnknown(name.to_string()))?;
        (def.handler)(context, arguments).await
    }
}

/// Wraps a tool result as the uniform MCP text-content envelope.
#[must_use]
pub fn wrap_response(result: &Value) -> Value {
    let text = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    serde_json::json!({ "content": [{ "type": "text", "text": text }] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &'static str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            "test tool",
            RequiredService::None,
            serde_json::json!({}),
            |_ctx, args| async move { Ok(args) },
        )
    }

    #[test]
    fn rejects_duplicate_registration() {
        let result = ToolRegistryBuilder::new()
            .register(def("a"))
            .and_then(|b| b.register(def("a")));
        assert!(result.is_err());
    }

    #[test]
    fn distinct_names_register_cleanly() {
        let registry = ToolRegistryBuilder::new()
            .register(def("a"))
            .and_then(|b| b.register(def("b")))
            .unwrap()
            .build();
        assert_eq!(registry.definitions().count(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistryBuilder::new().build();
        let ctx = test_context();
        let result = registry
            .dispatch(ctx, "nonexistent", Value::Null)
            .await;
        assert!(matches!(result, Err(BridgeError::ToolUnknown(_))));
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let registry = ToolRegistryBuilder::new().register(def("echo")).unwrap().build();
        let ctx = test_context();
        let result = registry
            .dispatch(ctx, "echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    fn test_context() -> Arc<ServiceContext> {
        let config = crate::config::Config { servers: vec![] };
        let servers = Arc::new(crate::lsp::ClientManager::new(
            config,
            std::path::PathBuf::from("."),
        ));
        let symbols = Arc::new(SymbolService::new(servers.clone()));
        let refactor = Arc::new(RefactorService::new(servers.clone(), symbols.clone()));
        let validator = Arc::new(PathValidator::new(vec![std::path::PathBuf::from(".")]));
        Arc::new(ServiceContext {
            symbols,
            refactor,
            servers,
            validator,
        })
    }
}
