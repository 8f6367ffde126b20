// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for full steps (`VariableAssignment` and workflow roots).

use super::{block_step_kind, resolve_assignment};
use crate::context::IterationCtx;
use crate::expr::{eval, ExprContext, ExprError};
use crate::EngineError;
use af_core::{
    BlockAst, LogLevel, StepDefinition, StepKind, StepState, TaskDefinition, TaskId, Value,
};

/// Evaluate every attribute expression, then layer in implicit declarations
/// and facet parameter defaults (explicit > implicit > default).
pub(super) fn facet_init_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    if step.kind == StepKind::Workflow {
        return workflow_init(step, ctx);
    }

    let stmt = resolve_assignment(ctx, step)?;
    let inputs = ctx.block_inputs(&step.block_id)?;
    let block = ctx.read_step(&step.block_id)?;
    let evaluated: Result<Vec<(String, Value)>, ExprError> = {
        let binding = block.as_ref().and_then(|b| match (&b.foreach_var, &b.foreach_value) {
            (Some(var), Some(value)) => Some((var.as_str(), value)),
            _ => None,
        });
        let scope = ctx.block_scope(step.block_id);
        let ectx = ExprContext { inputs: &inputs, reader: &scope, foreach: binding };
        stmt.args
            .iter()
            .map(|(name, expr)| eval(expr, &ectx).map(|value| (name.clone(), value)))
            .collect()
    };
    let evaluated = match evaluated {
        Ok(evaluated) => evaluated,
        Err(err) => {
            let message = err.to_string();
            ctx.log_framework(step, LogLevel::Error, &message, None);
            step.fail(message);
            return Ok(());
        }
    };

    for (name, value) in evaluated {
        step.attributes.set_param(name, value);
    }
    for implicit in ctx.program.implicits_for(&step.facet_name) {
        step.attributes.default_param(&implicit.param, implicit.value.clone());
    }
    if let Some(facet) = ctx.program.facet(&step.facet_name) {
        for param in &facet.params {
            if let Some(default) = &param.default {
                step.attributes.default_param(&param.name, default.clone());
            }
        }
    }

    step.request_advance();
    Ok(())
}

fn workflow_init(step: &mut StepDefinition, ctx: &mut IterationCtx<'_>) -> Result<(), EngineError> {
    for param in &ctx.workflow.params {
        let value = match (ctx.inputs.get(&param.name), &param.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) => {
                step.fail(format!("missing required input '{}'", param.name));
                return Ok(());
            }
        };
        step.attributes.set_param(param.name.clone(), value);
    }
    step.request_advance();
    Ok(())
}

/// Script blocks are declared in AFL but not executed by this runtime; a
/// facet body that is a list of blocks passes through untouched.
pub(super) fn facet_scripts_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    if let Some(facet) = ctx.program.facet(&step.facet_name) {
        if facet.script.is_some() {
            let message =
                format!("script execution is not supported (facet '{}')", step.facet_name);
            ctx.log_framework(step, LogLevel::Error, &message, None);
            step.fail(message);
            return Ok(());
        }
    }
    step.request_advance();
    Ok(())
}

/// Event facets either short-circuit through the inline dispatcher or emit
/// a task and park. Non-event facets pass straight through.
pub(super) fn event_transmit(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let is_event = ctx.program.facet(&step.facet_name).is_some_and(|f| f.event);
    if !is_event {
        step.request_advance();
        return Ok(());
    }

    // Re-entry while a task already exists (any state) stays parked: the
    // reply arrives through continue_step / fail_step, never by re-emitting.
    if ctx.task_for_step(&step.id)?.is_some() {
        step.park();
        return Ok(());
    }

    if ctx.dispatcher.can_dispatch(&step.facet_name) {
        let mut payload = step.attributes.params.clone();
        payload.insert("_facet_name".to_string(), Value::Str(step.facet_name.clone()));
        match ctx.dispatcher.dispatch(&step.facet_name, &payload) {
            Ok(Some(result)) => {
                step.attributes.merge_returns(&result);
                ctx.log_framework(
                    step,
                    LogLevel::Success,
                    format!("'{}' dispatched inline", step.facet_name),
                    None,
                );
                step.request_advance();
                return Ok(());
            }
            Ok(None) => {}
            Err(err) => {
                let message = err.to_string();
                ctx.log_framework(step, LogLevel::Error, &message, None);
                step.fail(message);
                return Ok(());
            }
        }
    }

    let task = TaskDefinition {
        id: TaskId::generate(),
        name: step.facet_name.clone(),
        step_id: step.id,
        workflow_id: step.workflow_id,
        flow_id: ctx.flow_id,
        runner_id: ctx.runner_id,
        state: af_core::TaskState::Pending,
        task_list_name: ctx.task_list_name.to_string(),
        data: step.attributes.params.clone(),
        error: None,
        created: ctx.now_ms,
        updated: ctx.now_ms,
    };
    tracing::debug!(task_id = %task.id, step_id = %step.id, name = %task.name, "task emitted");
    ctx.log_framework(
        step,
        LogLevel::Info,
        format!("task emitted for '{}'", step.facet_name),
        None,
    );
    ctx.record_task(task);
    step.park();
    Ok(())
}

/// Create block child steps. Precedence for block sources: the statement's
/// inline body, then the called facet's declared body. Multiple bodies fan
/// out as `block-N` children; a foreach clause fans out per element of its
/// iterable instead.
pub(super) fn statement_blocks_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let (bodies, stmt) = if step.kind == StepKind::Workflow {
        (ctx.workflow.body.clone(), None)
    } else {
        let stmt = resolve_assignment(ctx, step)?;
        let bodies = if !stmt.body.is_empty() {
            stmt.body.clone()
        } else {
            ctx.program.facet(&step.facet_name).map(|f| f.body.clone()).unwrap_or_default()
        };
        (bodies, Some(stmt))
    };

    if let Some(clause) = stmt.as_ref().and_then(|s| s.foreach.clone()) {
        return foreach_fan_out(step, ctx, &clause, bodies.first());
    }

    for (n, body) in bodies.iter().enumerate() {
        let child = new_block_child(ctx, step, block_step_kind(body.kind), format!("block-{}", n));
        ctx.record_step(child);
    }
    step.request_advance();
    Ok(())
}

fn foreach_fan_out(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
    clause: &af_core::ForeachClause,
    body: Option<&BlockAst>,
) -> Result<(), EngineError> {
    let Some(body) = body else {
        step.fail("foreach requires a block body");
        return Ok(());
    };

    let iterable = {
        let inputs = ctx.block_inputs(&step.block_id)?;
        let scope = ctx.block_scope(step.block_id);
        let ectx = ExprContext { inputs: &inputs, reader: &scope, foreach: None };
        eval(&clause.iterable, &ectx)
    };
    let items = match iterable {
        Ok(Value::Seq(items)) => items,
        Ok(other) => {
            step.fail(format!("foreach iterable must be a sequence, got {}", other.type_name()));
            return Ok(());
        }
        Err(err) => {
            let message = err.to_string();
            ctx.log_framework(step, LogLevel::Error, &message, None);
            step.fail(message);
            return Ok(());
        }
    };

    // An empty iterable fans out to nothing and the statement completes on
    // the next poll.
    for (n, item) in items.into_iter().enumerate() {
        let mut child =
            new_block_child(ctx, step, block_step_kind(body.kind), format!("block-{}", n));
        child.foreach_var = Some(clause.var.clone());
        child.foreach_value = Some(item);
        child.foreach_body = Some(body.clone());
        ctx.record_step(child);
    }
    step.request_advance();
    Ok(())
}

fn new_block_child(
    ctx: &IterationCtx<'_>,
    parent: &StepDefinition,
    kind: StepKind,
    statement_id: String,
) -> StepDefinition {
    let mut child = StepDefinition::new(kind, parent.workflow_id, ctx.now_ms);
    child.statement_id = statement_id;
    child.container_id = parent.id;
    child.block_id = parent.block_id;
    child.root_id = if parent.root_id.is_empty() { parent.id } else { parent.root_id };
    // The block inherits its container's params as the `$` scope of its
    // statements.
    child.attributes.params = parent.attributes.params.clone();
    child
}

/// Poll block children: advance once all are complete, fail if any failed.
pub(super) fn statement_blocks_continue(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let blocks = ctx.blocks_of(&step.id)?;
    if let Some(bad) = blocks.iter().find(|b| b.state == StepState::StatementError) {
        let cause = bad
            .transition
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        step.fail(format!("block '{}' failed: {}", bad.statement_id, cause));
        return Ok(());
    }

    if blocks.iter().all(|b| b.state == StepState::StatementComplete) {
        step.request_advance();
    } else {
        step.push_me();
    }
    Ok(())
}

/// Merge each completed yield child's params into this step's returns.
pub(super) fn statement_capture_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let blocks = ctx.blocks_of(&step.id)?;
    for block in blocks.iter().filter(|b| b.state == StepState::StatementComplete) {
        let children = ctx.steps_in_block(&block.id)?;
        for yield_step in children.iter().filter(|c| {
            c.kind == StepKind::YieldAssignment && c.state == StepState::StatementComplete
        }) {
            step.attributes.merge_returns(&yield_step.attributes.params);
        }
    }
    step.request_advance();
    Ok(())
}
