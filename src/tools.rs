// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The full MCP tool surface (spec §6), wired onto [`ToolRegistry`] (C11).
//!
//! Every tool is a plain `async fn(Arc<ServiceContext>, Value) ->
//! Result<Value, BridgeError>` registered by [`build_registry`]. Name-based
//! tools (`find_definition`, `find_references`, `rename_symbol`) resolve a
//! symbol name to a position via [`crate::symbol::SymbolService::find_symbol_matches`]
//! and delegate to the underlying position-based operation; every other
//! tool calls straight through to its owning service.
//!
//! `batch_execute` is the one exception to "plain `async fn`": it needs a
//! [`ToolRegistry`] of its own to dispatch sub-operations through, so
//! [`build_registry`] builds every other tool first, wraps that in an
//! `Arc`, and closes over it when registering `batch_execute` last. This
//! keeps `batch_execute` unable to recurse into itself, which is a feature
//! rather than a gap: nothing in spec §6 describes nesting one batch inside
//! another.

use std::path::PathBuf;
use std::sync::Arc;

use lsp_types::{CallHierarchyItem, PositionEncodingKind, SymbolKind, WorkspaceEdit};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::edit;
use crate::error::BridgeError;
use crate::path_utils::{HumanPosition, lsp_to_human};
use crate::refactor::{DeadCodeOptions, RenameFileOptions};
use crate::registry::{RequiredService, ServiceContext, ToolDefinition, ToolRegistry, ToolRegistryBuilder};
use crate::symbol::parse_symbol_kind;
use crate::workflow::{BatchOptions, Operation, WorkflowExecutor};

fn default_true() -> bool {
    true
}

fn default_threshold() -> usize {
    1
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, BridgeError> {
    serde_json::from_value(args).map_err(|e| BridgeError::Validation(e.to_string()))
}

fn parse_kind(name: Option<&str>) -> Result<Option<SymbolKind>, BridgeError> {
    name.map(|n| {
        parse_symbol_kind(n).ok_or_else(|| BridgeError::Validation(format!("unknown symbol kind `{n}`")))
    })
    .transpose()
}

fn symbol_kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum_member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type_parameter",
        _ => "unknown",
    }
}

fn with_warning(mut value: Value, warning: Option<String>) -> Value {
    if let (Some(warning), Value::Object(map)) = (warning, &mut value) {
        map.insert("warning".to_string(), Value::String(warning));
    }
    value
}

fn no_symbol_match(name: &str, file_path: &str) -> BridgeError {
    BridgeError::Validation(format!("no symbol named `{name}` found in {file_path}"))
}

// ---------------------------------------------------------------------
// Argument shapes
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FindDefinitionArgs {
    file_path: String,
    symbol_name: String,
    symbol_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindReferencesArgs {
    file_path: String,
    symbol_name: String,
    symbol_kind: Option<String>,
    #[serde(default = "default_true")]
    include_declaration: bool,
}

#[derive(Debug, Deserialize)]
struct RenameSymbolArgs {
    file_path: String,
    symbol_name: String,
    symbol_kind: Option<String>,
    new_name: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct RenameSymbolStrictArgs {
    file_path: String,
    line: u32,
    character: u32,
    new_name: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct FilePathArgs {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct SearchWorkspaceSymbolsArgs {
    query: String,
    workspace_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionArgs {
    file_path: String,
    line: u32,
    character: u32,
}

#[derive(Debug, Deserialize)]
struct TriggerPositionArgs {
    file_path: String,
    line: u32,
    character: u32,
    trigger_character: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallHierarchyCallsArgs {
    item: Option<Value>,
    file_path: Option<String>,
    line: Option<u32>,
    character: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RenameFileArgs {
    old_path: String,
    new_path: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct CreateFileArgs {
    file_path: String,
    content: Option<String>,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteFileArgs {
    file_path: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct RestartServerArgs {
    extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FindDeadCodeArgs {
    paths: Vec<String>,
    exported_kinds: Option<Vec<String>>,
    #[serde(default = "default_threshold")]
    reference_threshold: usize,
    #[serde(default = "default_true")]
    exclude_test_files: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BatchExecuteOptionsArgs {
    #[serde(default)]
    atomic: bool,
    #[serde(default)]
    parallel: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_true")]
    stop_on_error: bool,
}

#[derive(Debug, Deserialize)]
struct BatchExecuteArgs {
    operations: Vec<Operation>,
    #[serde(default)]
    options: BatchExecuteOptionsArgs,
}

// ---------------------------------------------------------------------
// Symbol navigation and rename
// ---------------------------------------------------------------------

async fn find_definition(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: FindDefinitionArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let kind = parse_kind(args.symbol_kind.as_deref())?;
    let matches = ctx
        .symbols
        .find_symbol_matches(&path, &args.symbol_name, kind)
        .await?;
    let Some(first) = matches.matches.first() else {
        return Err(no_symbol_match(&args.symbol_name, &args.file_path));
    };
    let position = lsp_to_human(first.selection_range.start);
    let locations = ctx.symbols.find_definition(&path, position).await?;
    Ok(with_warning(json!({ "locations": locations }), matches.warning))
}

async fn find_references(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: FindReferencesArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let kind = parse_kind(args.symbol_kind.as_deref())?;
    let matches = ctx
        .symbols
        .find_symbol_matches(&path, &args.symbol_name, kind)
        .await?;
    let Some(first) = matches.matches.first() else {
        return Err(no_symbol_match(&args.symbol_name, &args.file_path));
    };
    let position = lsp_to_human(first.selection_range.start);
    let locations = ctx
        .symbols
        .find_references(&path, position, args.include_declaration)
        .await?;
    Ok(with_warning(json!({ "locations": locations }), matches.warning))
}

/// Shapes a proposed or applied rename into the atomic-batch dry-run
/// convention (`workspace_edit`, `modified_files`).
async fn finish_rename(
    edit: Option<WorkspaceEdit>,
    dry_run: bool,
    warning: Option<String>,
) -> Result<Value, BridgeError> {
    let Some(workspace_edit) = edit else {
        return Ok(with_warning(
            json!({ "applied": false, "reason": "no rename available at this position" }),
            warning,
        ));
    };

    let normalized = edit::normalize(&workspace_edit).map_err(BridgeError::Internal)?;
    let modified_files: Vec<String> = normalized
        .file_edits
        .keys()
        .map(|p| p.display().to_string())
        .collect();

    if dry_run {
        return Ok(with_warning(
            json!({
                "dry_run": true,
                "workspace_edit": workspace_edit,
                "modified_files": modified_files,
            }),
            warning,
        ));
    }

    edit::apply_atomic(&normalized, PositionEncodingKind::UTF16).await?;
    Ok(with_warning(
        json!({
            "applied": true,
            "workspace_edit": workspace_edit,
            "modified_files": modified_files,
        }),
        warning,
    ))
}

async fn rename_symbol(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: RenameSymbolArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let kind = parse_kind(args.symbol_kind.as_deref())?;
    let matches = ctx
        .symbols
        .find_symbol_matches(&path, &args.symbol_name, kind)
        .await?;
    let Some(first) = matches.matches.first() else {
        return Err(no_symbol_match(&args.symbol_name, &args.file_path));
    };
    let position = lsp_to_human(first.selection_range.start);
    let edit = ctx
        .symbols
        .rename_symbol(&path, position, &args.new_name)
        .await?;
    finish_rename(edit, args.dry_run, matches.warning).await
}

async fn rename_symbol_strict(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: RenameSymbolStrictArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let position = HumanPosition {
        line: args.line,
        character: args.character,
    };
    let edit = ctx
        .symbols
        .rename_symbol_strict(&path, position, &args.new_name)
        .await?;
    finish_rename(edit, args.dry_run, None).await
}

// ---------------------------------------------------------------------
// Diagnostics, symbols, hover, completion, signature help
// ---------------------------------------------------------------------

async fn get_diagnostics(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: FilePathArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let diagnostics = ctx.symbols.get_diagnostics(&path, true).await?;
    Ok(json!({ "diagnostics": diagnostics }))
}

async fn get_document_symbols(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: FilePathArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let symbols = ctx.symbols.document_symbols(&path).await?;
    Ok(json!({ "symbols": symbols }))
}

async fn search_workspace_symbols(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: SearchWorkspaceSymbolsArgs = parse_args(args)?;
    if let Some(workspace_path) = &args.workspace_path {
        let new_root = PathBuf::from(workspace_path);
        let mut roots = ctx.servers.roots().await;
        if !roots.contains(&new_root) {
            roots.push(new_root);
            ctx.servers
                .sync_roots(roots)
                .await
                .map_err(BridgeError::Internal)?;
        }
    }
    let results = ctx.symbols.workspace_symbols(&args.query).await;
    Ok(json!({ "results": results }))
}

async fn get_hover(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: PositionArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let position = HumanPosition {
        line: args.line,
        character: args.character,
    };
    let hover = ctx.symbols.hover(&path, position).await?;
    Ok(json!({ "hover": hover }))
}

async fn get_completions(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: TriggerPositionArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let position = HumanPosition {
        line: args.line,
        character: args.character,
    };
    let completions = ctx
        .symbols
        .completion(&path, position, args.trigger_character)
        .await?;
    Ok(json!({ "completions": completions }))
}

async fn get_signature_help(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: TriggerPositionArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let position = HumanPosition {
        line: args.line,
        character: args.character,
    };
    let help = ctx
        .symbols
        .signature_help(&path, position, args.trigger_character)
        .await?;
    Ok(json!({ "signature_help": help }))
}

// ---------------------------------------------------------------------
// Call hierarchy
// ---------------------------------------------------------------------

async fn prepare_call_hierarchy(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: PositionArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    let position = HumanPosition {
        line: args.line,
        character: args.character,
    };
    let items = ctx.symbols.prepare_call_hierarchy(&path, position).await?;
    Ok(json!({ "items": items }))
}

async fn resolve_call_hierarchy_item(
    ctx: &ServiceContext,
    args: &CallHierarchyCallsArgs,
) -> Result<CallHierarchyItem, BridgeError> {
    if let Some(item) = &args.item {
        return serde_json::from_value(item.clone())
            .map_err(|e| BridgeError::Validation(format!("invalid call hierarchy item: {e}")));
    }

    let (Some(file_path), Some(line), Some(character)) = (&args.file_path, args.line, args.character)
    else {
        return Err(BridgeError::Validation(
            "provide either `item` or `file_path`, `line`, and `character`".to_string(),
        ));
    };

    let path = PathBuf::from(file_path);
    let position = HumanPosition { line, character };
    let items = ctx.symbols.prepare_call_hierarchy(&path, position).await?;
    items
        .and_then(|items| items.into_iter().next())
        .ok_or_else(|| {
            BridgeError::Validation(format!(
                "no call hierarchy item found at {file_path}:{line}:{character}"
            ))
        })
}

async fn get_call_hierarchy_incoming_calls(
    ctx: Arc<ServiceContext>,
    args: Value,
) -> Result<Value, BridgeError> {
    let args: CallHierarchyCallsArgs = parse_args(args)?;
    let item = resolve_call_hierarchy_item(&ctx, &args).await?;
    let calls = ctx.symbols.call_hierarchy_incoming_calls(item).await?;
    Ok(json!({ "calls": calls }))
}

async fn get_call_hierarchy_outgoing_calls(
    ctx: Arc<ServiceContext>,
    args: Value,
) -> Result<Value, BridgeError> {
    let args: CallHierarchyCallsArgs = parse_args(args)?;
    let item = resolve_call_hierarchy_item(&ctx, &args).await?;
    let calls = ctx.symbols.call_hierarchy_outgoing_calls(item).await?;
    Ok(json!({ "calls": calls }))
}

// ---------------------------------------------------------------------
// Filesystem tools
// ---------------------------------------------------------------------

async fn rename_file(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: RenameFileArgs = parse_args(args)?;
    let old = PathBuf::from(&args.old_path);
    let new = PathBuf::from(&args.new_path);
    let options = RenameFileOptions {
        dry_run: args.dry_run,
        ..RenameFileOptions::default()
    };
    let result = ctx.refactor.rename_file(&old, &new, options).await?;
    Ok(json!({
        "dry_run": args.dry_run,
        "workspace_edit": result.edit,
        "importers": result.importers,
        "moved": result
            .moved
            .into_iter()
            .map(|(old, new)| json!({ "old": old, "new": new }))
            .collect::<Vec<_>>(),
    }))
}

async fn create_file(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: CreateFileArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    ctx.validator
        .validate_write(&path)
        .map_err(BridgeError::Internal)?;

    if path.exists() && !args.overwrite {
        return Err(BridgeError::Validation(format!(
            "{} already exists; pass overwrite=true to replace it",
            args.file_path
        )));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BridgeError::Internal(e.into()))?;
    }
    tokio::fs::write(&path, args.content.unwrap_or_default())
        .await
        .map_err(|e| BridgeError::Internal(e.into()))?;

    Ok(json!({ "created": args.file_path }))
}

async fn delete_file(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: DeleteFileArgs = parse_args(args)?;
    let path = PathBuf::from(&args.file_path);
    ctx.validator
        .validate_write(&path)
        .map_err(BridgeError::Internal)?;

    if !args.force {
        let importers = ctx.refactor.find_importers(&path, true).await?;
        if !importers.is_empty() {
            return Err(BridgeError::ImporterConflict {
                importer_count: importers.len(),
                importers: importers
                    .into_iter()
                    .map(|p| p.display().to_string())
                    .collect(),
            });
        }
    }

    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| BridgeError::Internal(e.into()))?;
    Ok(json!({ "deleted": args.file_path }))
}

fn extract_workspace_edit(args: &Value) -> Result<WorkspaceEdit, BridgeError> {
    let candidate = if args.get("changes").is_some() || args.get("documentChanges").is_some() {
        args.clone()
    } else if let Some(edit) = args.get("edit") {
        edit.clone()
    } else {
        return Err(BridgeError::Validation(
            "apply_workspace_edit requires `changes` or `edit.changes`".to_string(),
        ));
    };
    serde_json::from_value(candidate)
        .map_err(|e| BridgeError::Validation(format!("invalid workspace edit: {e}")))
}

async fn apply_workspace_edit(_ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let dry_run = args.get("dry_run").and_then(Value::as_bool).unwrap_or(false);
    let workspace_edit = extract_workspace_edit(&args)?;
    let normalized = edit::normalize(&workspace_edit).map_err(BridgeError::Internal)?;
    let modified_files: Vec<String> = normalized
        .file_edits
        .keys()
        .map(|p| p.display().to_string())
        .collect();

    if dry_run {
        return Ok(json!({
            "dry_run": true,
            "workspace_edit": workspace_edit,
            "modified_files": modified_files,
        }));
    }

    edit::apply_atomic(&normalized, PositionEncodingKind::UTF16).await?;
    Ok(json!({
        "applied": true,
        "modified_files": modified_files,
        "edit_count": normalized.file_edits.values().map(Vec::len).sum::<usize>(),
    }))
}

async fn restart_server(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: RestartServerArgs = parse_args(args)?;
    let restarted = ctx
        .servers
        .restart_servers(args.extensions.as_deref())
        .await?;
    Ok(json!({ "restarted": restarted }))
}

// ---------------------------------------------------------------------
// Dead code analysis (spec §4.10 supplement to the §6 surface)
// ---------------------------------------------------------------------

async fn find_dead_code(ctx: Arc<ServiceContext>, args: Value) -> Result<Value, BridgeError> {
    let args: FindDeadCodeArgs = parse_args(args)?;
    let paths: Vec<PathBuf> = args.paths.iter().map(PathBuf::from).collect();
    let options = DeadCodeOptions {
        threshold: args.reference_threshold,
        exclude_test_files: args.exclude_test_files,
    };
    let dead = ctx.refactor.find_dead_code(&paths, options).await?;

    let allowed_kinds = args
        .exported_kinds
        .as_ref()
        .map(|kinds| {
            kinds
                .iter()
                .map(|k| {
                    parse_symbol_kind(k)
                        .ok_or_else(|| BridgeError::Validation(format!("unknown symbol kind `{k}`")))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let dead_symbols: Vec<Value> = dead
        .into_iter()
        .filter(|symbol| match &allowed_kinds {
            Some(kinds) => kinds.contains(&symbol.kind),
            None => true,
        })
        .map(|symbol| {
            json!({
                "name": symbol.name,
                "kind": symbol_kind_name(symbol.kind),
                "file": symbol.file.display().to_string(),
                "line": symbol.line,
                "character": symbol.character,
                "reference_count": symbol.reference_count,
            })
        })
        .collect();

    Ok(json!({ "dead_symbols": dead_symbols }))
}

// ---------------------------------------------------------------------
// Batch execution
// ---------------------------------------------------------------------

async fn run_batch_execute(
    registry: Arc<ToolRegistry>,
    ctx: Arc<ServiceContext>,
    args: Value,
) -> Result<Value, BridgeError> {
    let args: BatchExecuteArgs = parse_args(args)?;
    let options = BatchOptions {
        atomic: args.options.atomic,
        parallel: args.options.parallel,
        dry_run: args.options.dry_run,
        stop_on_error: args.options.stop_on_error,
    };
    let executor = WorkflowExecutor::new(registry, ctx);
    let result = executor.batch_execute(args.operations, options).await?;
    serde_json::to_value(result).map_err(|e| BridgeError::Internal(e.into()))
}

// ---------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------

fn position_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Path to the file" },
            "line": { "type": "integer", "description": "One-indexed line number" },
            "character": { "type": "integer", "description": "One-indexed column" }
        },
        "required": ["file_path", "line", "character"]
    })
}

fn trigger_position_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Path to the file" },
            "line": { "type": "integer", "description": "One-indexed line number" },
            "character": { "type": "integer", "description": "One-indexed column" },
            "trigger_character": { "type": "string", "description": "The character that triggered the request, if any" }
        },
        "required": ["file_path", "line", "character"]
    })
}

fn file_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Path to the file" }
        },
        "required": ["file_path"]
    })
}

fn symbol_name_schema(extra: Value) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "file_path": { "type": "string", "description": "Path to the file declaring the symbol" },
            "symbol_name": { "type": "string", "description": "The symbol's exact name" },
            "symbol_kind": { "type": "string", "description": "Optional LSP symbol kind filter, e.g. `function`" }
        },
        "required": ["file_path", "symbol_name"]
    });
    if let (Some(properties), Value::Object(extra_properties)) =
        (schema["properties"].as_object_mut(), extra)
    {
        properties.extend(extra_properties);
    }
    schema
}

fn call_hierarchy_calls_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "item": { "description": "A `CallHierarchyItem` returned by prepare_call_hierarchy" },
            "file_path": { "type": "string", "description": "Path to the file, if not using `item`" },
            "line": { "type": "integer", "description": "One-indexed line number, if not using `item`" },
            "character": { "type": "integer", "description": "One-indexed column, if not using `item`" }
        }
    })
}

// ---------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------

fn register_leaf_tools(mut builder: ToolRegistryBuilder) -> anyhow::Result<ToolRegistryBuilder> {
    builder = builder.register(ToolDefinition::new(
        "find_definition",
        "Finds the declaration of a named symbol in a file.",
        RequiredService::Symbol,
        symbol_name_schema(json!({})),
        find_definition,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "find_references",
        "Finds every reference to a named symbol in a file.",
        RequiredService::Symbol,
        symbol_name_schema(json!({
            "include_declaration": { "type": "boolean", "description": "Include the declaration itself (default true)" }
        })),
        find_references,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "rename_symbol",
        "Renames a named symbol across the workspace.",
        RequiredService::Symbol,
        symbol_name_schema(json!({
            "new_name": { "type": "string", "description": "The symbol's new name" },
            "dry_run": { "type": "boolean", "description": "Preview the edit without applying it (default false)" }
        })),
        rename_symbol,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "rename_symbol_strict",
        "Renames the symbol at an exact file position, retrying adjacent columns if nothing is found.",
        RequiredService::Symbol,
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "line": { "type": "integer", "description": "One-indexed line number" },
                "character": { "type": "integer", "description": "One-indexed column" },
                "new_name": { "type": "string" },
                "dry_run": { "type": "boolean", "description": "Preview the edit without applying it (default false)" }
            },
            "required": ["file_path", "line", "character", "new_name"]
        }),
        rename_symbol_strict,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_diagnostics",
        "Returns current diagnostics (errors, warnings, hints) for a file.",
        RequiredService::Diagnostic,
        file_schema(),
        get_diagnostics,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_document_symbols",
        "Returns the symbol outline of a file.",
        RequiredService::Symbol,
        file_schema(),
        get_document_symbols,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "search_workspace_symbols",
        "Searches for symbols matching a query across every active language server.",
        RequiredService::Symbol,
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Symbol name (sub)string to search for" },
                "workspace_path": { "type": "string", "description": "Additional workspace root to include in the search" }
            },
            "required": ["query"]
        }),
        search_workspace_symbols,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_hover",
        "Returns hover documentation for the symbol at a position.",
        RequiredService::Symbol,
        position_schema(),
        get_hover,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_completions",
        "Returns completion suggestions at a position.",
        RequiredService::Symbol,
        trigger_position_schema(),
        get_completions,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_signature_help",
        "Returns function signature help at a position.",
        RequiredService::Symbol,
        trigger_position_schema(),
        get_signature_help,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "prepare_call_hierarchy",
        "Prepares call hierarchy items for the symbol at a position.",
        RequiredService::Hierarchy,
        position_schema(),
        prepare_call_hierarchy,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_call_hierarchy_incoming_calls",
        "Returns the callers of a call hierarchy item.",
        RequiredService::Hierarchy,
        call_hierarchy_calls_schema(),
        get_call_hierarchy_incoming_calls,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "get_call_hierarchy_outgoing_calls",
        "Returns the callees of a call hierarchy item.",
        RequiredService::Hierarchy,
        call_hierarchy_calls_schema(),
        get_call_hierarchy_outgoing_calls,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "rename_file",
        "Moves or renames a file (or directory), rewriting every importer's specifiers.",
        RequiredService::Intelligence,
        json!({
            "type": "object",
            "properties": {
                "old_path": { "type": "string" },
                "new_path": { "type": "string" },
                "dry_run": { "type": "boolean", "description": "Preview the move and edits without touching disk (default false)" }
            },
            "required": ["old_path", "new_path"]
        }),
        rename_file,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "create_file",
        "Creates a new file, optionally with content.",
        RequiredService::File,
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "content": { "type": "string" },
                "overwrite": { "type": "boolean", "description": "Replace the file if it already exists (default false)" }
            },
            "required": ["file_path"]
        }),
        create_file,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "delete_file",
        "Deletes a file, refusing if it has importers unless force is set.",
        RequiredService::File,
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "force": { "type": "boolean", "description": "Delete even if other files still import it (default false)" }
            },
            "required": ["file_path"]
        }),
        delete_file,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "apply_workspace_edit",
        "Applies a raw LSP WorkspaceEdit (as `changes` or `edit.changes`) atomically.",
        RequiredService::File,
        json!({
            "type": "object",
            "properties": {
                "changes": { "type": "object", "description": "Map of file URI to text edits" },
                "edit": { "type": "object", "description": "A full WorkspaceEdit, as an alternative to `changes`" },
                "validate_before_apply": { "type": "boolean", "description": "Reserved; edits are always validated before being applied (default true)" },
                "dry_run": { "type": "boolean", "description": "Preview the edit without applying it (default false)" }
            }
        }),
        apply_workspace_edit,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "restart_server",
        "Restarts language servers, by extension, or all of them if none are named.",
        RequiredService::Lsp,
        json!({
            "type": "object",
            "properties": {
                "extensions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Extensions to restart; every active server is restarted if omitted"
                }
            }
        }),
        restart_server,
    ))?;
    builder = builder.register(ToolDefinition::new(
        "find_dead_code",
        "Reports exported symbols with fewer references than a threshold.",
        RequiredService::Intelligence,
        json!({
            "type": "object",
            "properties": {
                "paths": { "type": "array", "items": { "type": "string" }, "description": "Files to analyze" },
                "exported_kinds": { "type": "array", "items": { "type": "string" }, "description": "Restrict to these symbol kinds" },
                "reference_threshold": { "type": "integer", "description": "Report symbols referenced fewer times than this (default 1)" },
                "exclude_test_files": { "type": "boolean", "description": "Skip test files (default true)" }
            },
            "required": ["paths"]
        }),
        find_dead_code,
    ))?;
    Ok(builder)
}

fn batch_execute_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "operations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "tool": { "type": "string" },
                        "args": { "type": "object" },
                        "id": { "type": "string" }
                    },
                    "required": ["tool"]
                }
            },
            "options": {
                "type": "object",
                "properties": {
                    "atomic": { "type": "boolean", "description": "Combine every operation's edit into one transaction" },
                    "parallel": { "type": "boolean", "description": "Dispatch every operation concurrently" },
                    "dry_run": { "type": "boolean", "description": "Force dry_run on every operation" },
                    "stop_on_error": { "type": "boolean", "description": "In sequential mode, halt on the first failure (default true)" }
                }
            }
        },
        "required": ["operations"]
    })
}

/// Builds the complete tool registry (spec §6).
///
/// `batch_execute` is registered last, against an inner registry holding
/// every other tool, so it can dispatch sub-operations without being able
/// to recurse into itself.
///
/// # Errors
///
/// Returns an error if two tools are registered under the same name (a
/// programming error in this module, not a runtime condition).
pub fn build_registry() -> anyhow::Result<Arc<ToolRegistry>> {
    let leaf_registry = Arc::new(register_leaf_tools(ToolRegistryBuilder::new())?.build());

    let mut builder = ToolRegistryBuilder::new();
    for def in leaf_registry.definitions() {
        builder = builder.register(def.clone())?;
    }

    let batch_registry = leaf_registry.clone();
    builder = builder.register(ToolDefinition::new(
        "batch_execute",
        "Executes a declared list of tool calls sequentially, in parallel, or as one atomic transaction.",
        RequiredService::ServiceContext,
        batch_execute_schema(),
        move |ctx, args| {
            let registry = batch_registry.clone();
            async move { run_batch_execute(registry, ctx, args).await }
        },
    ))?;

    Ok(Arc::new(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_accepts_known_names_case_insensitively() {
        assert_eq!(parse_kind(Some("Function")).unwrap(), Some(SymbolKind::FUNCTION));
        assert_eq!(parse_kind(None).unwrap(), None);
    }

    #[test]
    fn parse_kind_rejects_unknown_names() {
        assert!(parse_kind(Some("not-a-kind")).is_err());
    }

    #[test]
    fn symbol_kind_name_round_trips_through_parse_symbol_kind() {
        for kind in [
            SymbolKind::CLASS,
            SymbolKind::METHOD,
            SymbolKind::FUNCTION,
            SymbolKind::VARIABLE,
        ] {
            let name = symbol_kind_name(kind);
            assert_eq!(parse_symbol_kind(name), Some(kind));
        }
    }

    #[test]
    fn with_warning_only_touches_objects() {
        let value = with_warning(json!({"a": 1}), Some("careful".to_string()));
        assert_eq!(value["warning"], json!("careful"));

        let value = with_warning(json!([1, 2]), Some("ignored".to_string()));
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn extract_workspace_edit_accepts_top_level_changes() {
        let args = json!({ "changes": {} });
        assert!(extract_workspace_edit(&args).is_ok());
    }

    #[test]
    fn extract_workspace_edit_accepts_nested_edit() {
        let args = json!({ "edit": { "changes": {} } });
        assert!(extract_workspace_edit(&args).is_ok());
    }

    #[test]
    fn extract_workspace_edit_rejects_missing_shape() {
        let args = json!({ "unrelated": true });
        assert!(extract_workspace_edit(&args).is_err());
    }

    #[test]
    fn build_registry_lists_the_full_tool_surface() {
        let registry = build_registry().unwrap();
        let names: Vec<&str> = registry.definitions().map(ToolDefinition::name).collect();
        for expected in [
            "find_definition",
            "find_references",
            "rename_symbol",
            "rename_symbol_strict",
            "get_diagnostics",
            "get_document_symbols",
            "search_workspace_symbols",
            "get_hover",
            "get_completions",
            "get_signature_help",
            "prepare_call_hierarchy",
            "get_call_hierarchy_incoming_calls",
            "get_call_hierarchy_outgoing_calls",
            "rename_file",
            "create_file",
            "delete_file",
            "apply_workspace_edit",
            "restart_server",
            "find_dead_code",
            "batch_execute",
        ] {
            assert!(names.contains(&expected), "missing tool `{expected}`");
        }
    }
}
