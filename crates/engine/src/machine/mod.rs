// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-step state machine.
//!
//! [`drive`] is the orchestrator: it runs the current state's handler, then
//! advances through the step's state table for as long as the handler
//! requests it. It exits when the step is terminal, stops requesting
//! advance (parked), or asks to be re-queued for the next iteration
//! (`push_me`).
//!
//! Handlers never hardcode successor states; the tables in `af_core::state`
//! are the single source of ordering.

mod block;
mod schema;
mod step;
mod yields;

use crate::context::IterationCtx;
use crate::EngineError;
use af_core::{
    AssignmentStatement, BlockAst, BlockKind, Statement, StepDefinition, StepKind, StepState,
};

pub(crate) fn drive(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    // A persisted request_transition (from continue_step) means the current
    // state's work is done; skip straight to advancing.
    if !step.transition.request_transition && !step.is_terminal() {
        invoke(step.state, step, ctx)?;
    }

    while step.transition.request_transition && !step.is_terminal() {
        let Some(next) = step.next_state() else {
            break;
        };
        let prev = step.state;
        step.state = next;
        step.transition.reset();
        step.transition.changed = true;
        tracing::debug!(
            step_id = %step.id,
            kind = %step.kind,
            from = %prev,
            to = %next,
            "step transition"
        );
        invoke(next, step, ctx)?;
        if step.transition.push_me {
            break;
        }
    }
    Ok(())
}

fn invoke(
    state: StepState,
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    use StepState::*;
    match state {
        // Terminal states have no handler.
        StatementComplete | StatementError => Ok(()),

        FacetInitBegin => match step.kind {
            StepKind::YieldAssignment => yields::init_begin(step, ctx),
            StepKind::SchemaInstantiation => schema::init_begin(step, ctx),
            _ => step::facet_init_begin(step, ctx),
        },
        FacetScriptsBegin => match step.kind {
            StepKind::YieldAssignment => {
                step.request_advance();
                Ok(())
            }
            _ => step::facet_scripts_begin(step, ctx),
        },
        EventTransmit => step::event_transmit(step, ctx),
        StatementBlocksBegin => step::statement_blocks_begin(step, ctx),
        StatementBlocksContinue => step::statement_blocks_continue(step, ctx),
        StatementCaptureBegin => step::statement_capture_begin(step, ctx),

        BlockExecutionBegin => block::execution_begin(step, ctx),
        BlockExecutionContinue => block::execution_continue(step, ctx),

        // Everything else, including the mixin states, is a pass-through.
        Created | FacetInitEnd | FacetScriptsEnd | MixinBlocksBegin | MixinBlocksContinue
        | MixinBlocksEnd | MixinCaptureBegin | MixinCaptureEnd | StatementBlocksEnd
        | StatementCaptureEnd | BlockExecutionEnd | StatementEnd => {
            step.request_advance();
            Ok(())
        }
    }
}

/// Map a body block's combinator to the step kind of its block step.
pub(crate) fn block_step_kind(kind: BlockKind) -> StepKind {
    match kind {
        BlockKind::AndThen => StepKind::AndThen,
        BlockKind::AndMap => StepKind::AndMap,
        BlockKind::AndMatch => StepKind::AndMatch,
    }
}

fn block_index(statement_id: &str) -> Option<usize> {
    statement_id.strip_prefix("block-")?.parse().ok()
}

/// Resolve the AST governing a block step: a cached foreach body, the
/// workflow root body, the container statement's inline body, or the called
/// facet's declared body — in that precedence.
pub(crate) fn resolve_block_ast(
    ctx: &IterationCtx<'_>,
    block: &StepDefinition,
) -> Result<BlockAst, EngineError> {
    if let Some(body) = &block.foreach_body {
        return Ok(body.clone());
    }

    let container = ctx
        .read_step(&block.container_id)?
        .ok_or(EngineError::StepNotFound(block.container_id))?;
    let n = block_index(&block.statement_id).ok_or_else(|| {
        EngineError::Internal(format!("malformed block statement id '{}'", block.statement_id))
    })?;

    let out_of_range = || {
        EngineError::Internal(format!(
            "block index {} out of range for step {}",
            n, container.id
        ))
    };

    if container.kind == StepKind::Workflow {
        return ctx.workflow.body.get(n).cloned().ok_or_else(out_of_range);
    }

    let stmt = resolve_assignment(ctx, &container)?;
    if !stmt.body.is_empty() {
        return stmt.body.get(n).cloned().ok_or_else(out_of_range);
    }
    ctx.program
        .facet(&container.facet_name)
        .map(|f| f.body.clone())
        .unwrap_or_default()
        .get(n)
        .cloned()
        .ok_or_else(out_of_range)
}

/// Resolve the AST statement a step instantiates, through its containing
/// block.
pub(crate) fn resolve_statement(
    ctx: &IterationCtx<'_>,
    step: &StepDefinition,
) -> Result<Statement, EngineError> {
    let block = ctx
        .read_step(&step.block_id)?
        .ok_or(EngineError::StepNotFound(step.block_id))?;
    let ast = resolve_block_ast(ctx, &block)?;
    ast.statements
        .iter()
        .find(|s| s.id() == step.statement_id)
        .cloned()
        .ok_or_else(|| {
            EngineError::Internal(format!(
                "statement '{}' not found in block {}",
                step.statement_id, block.id
            ))
        })
}

pub(crate) fn resolve_assignment(
    ctx: &IterationCtx<'_>,
    step: &StepDefinition,
) -> Result<AssignmentStatement, EngineError> {
    match resolve_statement(ctx, step)? {
        Statement::Assignment(a) => Ok(a),
        Statement::Yield(_) => Err(EngineError::Internal(format!(
            "step {} expected an assignment statement",
            step.id
        ))),
    }
}

/// Create a child step record for a statement inside `block`.
pub(crate) fn new_statement_step(
    ctx: &IterationCtx<'_>,
    block: &StepDefinition,
    stmt: &Statement,
) -> StepDefinition {
    let (kind, facet_name) = match stmt {
        Statement::Assignment(a) => {
            if ctx.program.schema(&a.facet).is_some() {
                (StepKind::SchemaInstantiation, a.facet.clone())
            } else {
                (StepKind::VariableAssignment, a.facet.clone())
            }
        }
        Statement::Yield(y) => (StepKind::YieldAssignment, y.target.clone()),
    };

    let mut child = StepDefinition::new(kind, block.workflow_id, ctx.now_ms);
    child.facet_name = facet_name;
    child.statement_id = stmt.id();
    child.container_id = block.id;
    child.block_id = block.id;
    child.root_id = block.root_id;
    child
}
