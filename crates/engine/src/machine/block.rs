// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for block steps.

use super::{new_statement_step, resolve_block_ast};
use crate::context::IterationCtx;
use crate::graph::DepGraph;
use crate::EngineError;
use af_core::{StepDefinition, StepState};
use std::collections::BTreeSet;

/// Resolve the block's AST, build its dependency graph, and create step
/// records for statements that are ready with no prerequisites. Yields are
/// never created here — they wait until their references are committed
/// complete.
pub(super) fn execution_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let ast = resolve_block_ast(ctx, step)?;
    let graph = DepGraph::build(&ast, step.foreach_var.as_deref());

    let existing: BTreeSet<String> =
        ctx.steps_in_block(&step.id)?.into_iter().map(|s| s.statement_id).collect();
    let ready: Vec<String> = graph
        .ready(&BTreeSet::new())
        .into_iter()
        .filter(|e| !e.is_yield && !existing.contains(&e.id))
        .map(|e| e.id.clone())
        .collect();

    for id in ready {
        if let Some(stmt) = ast.statements.iter().find(|s| s.id() == id) {
            let child = new_statement_step(ctx, step, stmt);
            ctx.record_step(child);
        }
    }

    step.request_advance();
    Ok(())
}

/// Poll the block: fail on a failed statement, create newly-released
/// statements (yields included, against committed completions only), and
/// advance once every statement in the graph is complete.
pub(super) fn execution_continue(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let ast = resolve_block_ast(ctx, step)?;
    let graph = DepGraph::build(&ast, step.foreach_var.as_deref());
    let children = ctx.steps_in_block(&step.id)?;

    if let Some(bad) = children.iter().find(|c| c.state == StepState::StatementError) {
        let cause = bad
            .transition
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        step.fail(format!("statement '{}' failed: {}", bad.statement_id, cause));
        return Ok(());
    }

    // Release against committed completions: a step created here may read
    // its references immediately, so they must already be persisted.
    let committed = ctx.committed_in_block(&step.id)?;
    let existing: BTreeSet<String> =
        children.iter().map(|c| c.statement_id.clone()).collect();
    let ready: Vec<String> = graph
        .ready(&committed)
        .into_iter()
        .filter(|e| !existing.contains(&e.id))
        .map(|e| e.id.clone())
        .collect();
    for id in ready {
        if let Some(stmt) = ast.statements.iter().find(|s| s.id() == id) {
            let child = new_statement_step(ctx, step, stmt);
            ctx.record_step(child);
        }
    }

    // Completion, by contrast, may see this iteration's pending writes.
    let complete: BTreeSet<String> = children
        .iter()
        .filter(|c| c.state == StepState::StatementComplete)
        .map(|c| c.statement_id.clone())
        .collect();
    if graph.is_complete(&complete) {
        step.request_advance();
    } else {
        step.push_me();
    }
    Ok(())
}
