// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for yield steps.
//!
//! A yield evaluates its arguments into its own params; the containing
//! step's capture phase merges them into its returns once the block
//! completes.

use super::resolve_statement;
use crate::context::IterationCtx;
use crate::expr::{eval, ExprContext, ExprError};
use crate::EngineError;
use af_core::{LogLevel, Statement, StepDefinition, Value};

pub(super) fn init_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let stmt = match resolve_statement(ctx, step)? {
        Statement::Yield(y) => y,
        Statement::Assignment(_) => {
            return Err(EngineError::Internal(format!(
                "step {} expected a yield statement",
                step.id
            )))
        }
    };

    let evaluated: Result<Vec<(String, Value)>, ExprError> = {
        let inputs = ctx.block_inputs(&step.block_id)?;
        let block = ctx.read_step(&step.block_id)?;
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

    match evaluated {
        Ok(values) => {
            for (name, value) in values {
                step.attributes.set_param(name, value);
            }
            step.request_advance();
        }
        Err(err) => {
            let message = err.to_string();
            ctx.log_framework(step, LogLevel::Error, &message, None);
            step.fail(message);
        }
    }
    Ok(())
}
