// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Batch and workflow execution across multiple tool calls (C10).
//!
//! `batch_execute` dispatches a declared list of `{tool, args, id?}`
//! operations through a [`ToolRegistry`] in one of four modes (sequential,
//! parallel, atomic, dry-run). A named [`Workflow`] layers templated step
//! arguments (`{{input.field}}`, `{{stepId.result.path}}`) on top, resolved
//! by a typed path-expression evaluator that refuses unknown references at
//! plan time rather than failing mid-run (spec §9 redesign flag replacing
//! string-templated steps).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use lsp_types::{PositionEncodingKind, WorkspaceEdit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::edit::{self, NormalizedEdit, ResourceOperation};
use crate::error::BridgeError;
use crate::registry::{ServiceContext, ToolRegistry};

/// A single operation submitted to `batch_execute` (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    /// The registered tool name to invoke.
    pub tool: String,
    /// Arguments for the tool, as raw JSON.
    #[serde(default)]
    pub args: Value,
    /// An optional caller-supplied identifier, echoed back in the result.
    pub id: Option<String>,
}

/// Options governing a `batch_execute` call (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Build a single combined transaction and commit it atomically.
    pub atomic: bool,
    /// Dispatch every operation concurrently.
    pub parallel: bool,
    /// Force `dry_run=true` onto every operation's arguments.
    pub dry_run: bool,
    /// In sequential mode, halt on the first failure.
    pub stop_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            atomic: false,
            parallel: false,
            dry_run: false,
            stop_on_error: true,
        }
    }
}

/// The outcome of a single operation within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    /// The operation's submitted id, if any.
    pub id: Option<String>,
    /// The tool that was invoked.
    pub tool: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// The tool's JSON result, if it succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error message, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The aggregate result of a `batch_execute` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    /// Per-operation outcomes.
    pub results: Vec<OperationOutcome>,
    /// True if the batch halted before running every operation
    /// (`stop_on_error` sequential halt, or an atomic dry-run failure).
    pub aborted: bool,
}

/// A mutating tool's dry-run response shape, by convention: a handler
/// asked to dry-run reports the `WorkspaceEdit` and file moves it *would*
/// perform under these two optional fields, so `batch_execute { atomic:
/// true }` can aggregate them into one combined transaction without
/// re-deriving tool-specific knowledge.
#[derive(Debug, Clone, Default, Deserialize)]
struct DryRunOutcome {
    #[serde(default)]
    workspace_edit: Option<WorkspaceEdit>,
    #[serde(default)]
    moved: Vec<MoveIntent>,
}

#[derive(Debug, Clone, Deserialize)]
struct MoveIntent {
    old: PathBuf,
    new: PathBuf,
}

/// Dispatches batches and named workflows against a shared tool registry
/// and service context.
pub struct WorkflowExecutor {
    registry: Arc<ToolRegistry>,
    context: Arc<ServiceContext>,
}

impl WorkflowExecutor {
    /// Creates a new executor over a registry and its service context.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, context: Arc<ServiceContext>) -> Self {
        Self { registry, context }
    }

    /// `batch_execute(operations, options)` (spec §4.8).
    ///
    /// # Errors
    ///
    /// Returns an error if the atomic transaction's aggregate edit fails to
    /// apply; individual operation failures are reported per-operation
    /// instead of short-circuiting this `Result`.
    pub async fn batch_execute(
        &self,
        operations: Vec<Operation>,
        options: BatchOptions,
    ) -> Result<BatchResult, BridgeError> {
        if options.atomic {
            return self.execute_atomic(operations).await;
        }
        if options.parallel {
            self.execute_parallel(operations, options.dry_run).await
        } else {
            self.execute_sequential(operations, options.dry_run, options.stop_on_error)
                .await
        }
    }

    async fn execute_sequential(
        &self,
        operations: Vec<Operation>,
        dry_run: bool,
        stop_on_error: bool,
    ) -> Result<BatchResult, BridgeError> {
        let mut results = Vec::with_capacity(operations.len());
        let mut aborted = false;

        for op in operations {
            let args = apply_dry_run(op.args.clone(), dry_run);
            match self.registry.dispatch(self.context.clone(), &op.tool, args).await {
                Ok(value) => results.push(OperationOutcome {
                    id: op.id,
                    tool: op.tool,
                    success: true,
                    result: Some(value),
                    error: None,
                }),
                Err(e) => {
                    results.push(OperationOutcome {
                        id: op.id,
                        tool: op.tool,
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    if stop_on_error {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        Ok(BatchResult { results, aborted })
    }

    async fn execute_parallel(
        &self,
        operations: Vec<Operation>,
        dry_run: bool,
    ) -> Result<BatchResult, BridgeError> {
        let mut set = tokio::task::JoinSet::new();
        for op in operations {
            let registry = self.registry.clone();
            let context = self.context.clone();
            let args = apply_dry_run(op.args.clone(), dry_run);
            let id = op.id.clone();
            let tool = op.tool.clone();
            set.spawn(async move {
                let outcome = registry.dispatch(context, &tool, args).await;
                (id, tool, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, tool, Ok(value))) => results.push(OperationOutcome {
                    id,
                    tool,
                    success: true,
                    result: Some(value),
                    error: None,
                }),
                Ok((id, tool, Err(e))) => results.push(OperationOutcome {
                    id,
                    tool,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                }),
                Err(join_error) => results.push(OperationOutcome {
                    id: None,
                    tool: String::new(),
                    success: false,
                    result: None,
                    error: Some(join_error.to_string()),
                }),
            }
        }

        Ok(BatchResult {
            results,
            aborted: false,
        })
    }

    async fn execute_atomic(&self, operations: Vec<Operation>) -> Result<BatchResult, BridgeError> {
        let mut results = Vec::with_capacity(operations.len());
        let mut file_edits: HashMap<PathBuf, Vec<lsp_types::TextEdit>> = HashMap::new();
        let mut resource_ops = Vec::new();

        for op in &operations {
            let dry_args = apply_dry_run(op.args.clone(), true);
            match self
                .registry
                .dispatch(self.context.clone(), &op.tool, dry_args)
                .await
            {
                Ok(value) => {
                    if let Ok(outcome) = serde_json::from_value::<DryRunOutcome>(value.clone()) {
                        if let Some(edit) = outcome.workspace_edit {
                            let normalized = edit::normalize(&edit).map_err(BridgeError::Internal)?;
                            for (path, edits) in normalized.file_edits {
                                file_edits.entry(path).or_default().extend(edits);
                            }
                        }
                        for mv in outcome.moved {
                            resource_ops.push(ResourceOperation::Rename(mv.old, mv.new));
                        }
                    }
                    results.push(OperationOutcome {
                        id: op.id.clone(),
                        tool: op.tool.clone(),
                        success: true,
                        result: Some(value),
                        error: None,
                    });
                }
                Err(e) => {
                    results.push(OperationOutcome {
                        id: op.id.clone(),
                        tool: op.tool.clone(),
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    return Ok(BatchResult {
                        results,
                        aborted: true,
                    });
                }
            }
        }

        let normalized = NormalizedEdit {
            file_edits,
            resource_ops,
        };
        if !normalized.file_edits.is_empty() || !normalized.resource_ops.is_empty() {
            edit::apply_atomic(&normalized, PositionEncodingKind::UTF16).await?;
        }

        Ok(BatchResult {
            results,
            aborted: false,
        })
    }

    /// Runs a named [`Workflow`], resolving each step's templated
    /// arguments from `input` and prior steps' results before dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error if a step references an unknown path (checked for
    /// every step before any step runs) or if a step's dispatch fails.
    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        input: Value,
    ) -> Result<HashMap<String, Value>, BridgeError> {
        validate_template_refs(&workflow.steps).map_err(BridgeError::Internal)?;

        let mut results = HashMap::new();
        for step in &workflow.steps {
            let args = substitute(&step.args, &input, &results).map_err(BridgeError::Internal)?;
            let outcome = self
                .registry
                .dispatch(self.context.clone(), &step.tool, args)
                .await?;
            results.insert(step.id.clone(), outcome);
        }
        Ok(results)
    }
}

fn apply_dry_run(mut args: Value, dry_run: bool) -> Value {
    if dry_run {
        if let Value::Object(map) = &mut args {
            map.insert("dry_run".to_string(), Value::Bool(true));
        }
    }
    args
}

/// A named sequence of steps with templated arguments (spec §4.8).
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    /// The workflow's name.
    pub name: String,
    /// Its steps, in declared (and executed) order.
    pub steps: Vec<WorkflowStep>,
}

/// A single workflow step.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStep {
    /// This step's id, referenceable by later steps as `{{id.result...}}`.
    pub id: String,
    /// The tool to invoke.
    pub tool: String,
    /// Templated arguments, resolved against `input` and prior results.
    pub args: Value,
}

static TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_]+(?:\.[a-zA-Z0-9_]+)*)\s*\}\}").unwrap());

/// Checks every step's templated arguments reference only `input` or the
/// id of a step declared earlier in the sequence, before any step runs.
fn validate_template_refs(steps: &[WorkflowStep]) -> anyhow::Result<()> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in steps {
        for expr in collect_template_exprs(&step.args) {
            let root = expr.split('.').next().unwrap_or("");
            if root != "input" && !seen_ids.contains(root) {
                anyhow::bail!(
                    "workflow step `{}` references unknown path `{{{{{expr}}}}}`",
                    step.id
                );
            }
        }
        seen_ids.insert(step.id.as_str());
    }
    Ok(())
}

fn collect_template_exprs(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_template_exprs_inner(value, &mut out);
    out
}

fn collect_template_exprs_inner(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in TEMPLATE.captures_iter(s) {
                if let Some(m) = caps.get(1) {
                    out.push(m.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_template_exprs_inner(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_template_exprs_inner(v, out)),
        _ => {}
    }
}

fn resolve_template(
    expr: &str,
    input: &Value,
    results: &HashMap<String, Value>,
) -> anyhow::Result<Value> {
    let mut parts = expr.split('.');
    let root = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty template expression"))?;

    let mut current = if root == "input" {
        input
    } else {
        results
            .get(root)
            .ok_or_else(|| anyhow::anyhow!("unknown step reference `{root}`"))?
    };

    for segment in parts {
        current = current
            .get(segment)
            .ok_or_else(|| anyhow::anyhow!("path `{expr}` has no field `{segment}`"))?;
    }
    Ok(current.clone())
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolves every `{{...}}` expression in `value` against `input` and
/// prior step `results`. A string that is *entirely* one expression is
/// replaced by the resolved value verbatim (preserving its JSON type);
/// a string with embedded expressions gets them stringified in place.
fn substitute(
    value: &Value,
    input: &Value,
    results: &HashMap<String, Value>,
) -> anyhow::Result<Value> {
    match value {
        Value::String(s) => {
            if let Some(caps) = TEMPLATE.captures(s) {
                let whole_match = caps.get(0).expect("capture group 0 always present");
                if whole_match.start() == 0 && whole_match.end() == s.len() {
                    let expr = caps.get(1).expect("pattern has one capture group").as_str();
                    return resolve_template(expr, input, results);
                }
            }

            let mut replaced = String::new();
            let mut last = 0;
            for caps in TEMPLATE.captures_iter(s) {
                let whole_match = caps.get(0).expect("capture group 0 always present");
                let expr = caps.get(1).expect("pattern has one capture group").as_str();
                replaced.push_str(&s[last..whole_match.start()]);
                replaced.push_str(&value_to_plain_string(&resolve_template(
                    expr, input, results,
                )?));
                last = whole_match.end();
            }
            replaced.push_str(&s[last..]);

            if replaced == *s {
                Ok(value.clone())
            } else {
                Ok(Value::String(replaced))
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute(item, input, results)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, input, results)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_string_template_preserves_json_type() {
        let input = serde_json::json!({"count": 3});
        let results = HashMap::new();
        let resolved = substitute(
            &Value::String("{{input.count}}".to_string()),
            &input,
            &results,
        )
        .unwrap();
        assert_eq!(resolved, serde_json::json!(3));
    }

    #[test]
    fn embedded_template_stringifies() {
        let input = serde_json::json!({"name": "util"});
        let results = HashMap::new();
        let resolved = substitute(
            &Value::String("prefix-{{input.name}}-suffix".to_string()),
            &input,
            &results,
        )
        .unwrap();
        assert_eq!(resolved, serde_json::json!("prefix-util-suffix"));
    }

    #[test]
    fn resolves_prior_step_result_path() {
        let input = Value::Null;
        let mut results = HashMap::new();
        results.insert(
            "step1".to_string(),
            serde_json::json!({"result": {"path": "/tmp/a.rs"}}),
        );
        let resolved = substitute(
            &Value::String("{{step1.result.path}}".to_string()),
            &input,
            &results,
        )
        .unwrap();
        assert_eq!(resolved, serde_json::json!("/tmp/a.rs"));
    }

    #[test]
    fn plan_time_validation_rejects_forward_reference() {
        let steps = vec![
            WorkflowStep {
                id: "a".to_string(),
                tool: "noop".to_string(),
                args: serde_json::json!({"x": "{{b.result}}"}),
            },
            WorkflowStep {
                id: "b".to_string(),
                tool: "noop".to_string(),
                args: Value::Null,
            },
        ];
        assert!(validate_template_refs(&steps).is_err());
    }

    #[test]
    fn plan_time_validation_accepts_input_and_prior_steps() {
        let steps = vec![
            WorkflowStep {
                id: "a".to_string(),
                tool: "noop".to_string(),
                args: serde_json::json!({"x": "{{input.path}}"}),
            },
            WorkflowStep {
                id: "b".to_string(),
                tool: "noop".to_string(),
                args: serde_json::json!({"x": "{{a.result}}"}),
            },
        ];
        assert!(validate_template_refs(&steps).is_ok());
    }

    #[test]
    fn batch_options_default_is_sequential_stop_on_error() {
        let options = BatchOptions::default();
        assert!(!options.atomic);
        assert!(!options.parallel);
        assert!(!options.dry_run);
        assert!(options.stop_on_error);
    }
}
