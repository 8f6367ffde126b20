// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers for schema instantiation steps.
//!
//! Evaluated arguments are stored as returns, not params, so callers read
//! instance fields directly via `stepname.field`.

use super::resolve_assignment;
use crate::context::IterationCtx;
use crate::expr::{eval, ExprContext, ExprError};
use crate::EngineError;
use af_core::{LogLevel, StepDefinition, Value};

pub(super) fn init_begin(
    step: &mut StepDefinition,
    ctx: &mut IterationCtx<'_>,
) -> Result<(), EngineError> {
    let stmt = resolve_assignment(ctx, step)?;
    let Some(schema) = ctx.program.schema(&step.facet_name) else {
        step.fail(format!("unknown schema '{}'", step.facet_name));
        return Ok(());
    };

    if let Some(unknown) = stmt.args.keys().find(|name| !schema.fields.contains(name)) {
        let message = format!("unknown field '{}' on schema '{}'", unknown, schema.name);
        ctx.log_framework(step, LogLevel::Error, &message, None);
        step.fail(message);
        return Ok(());
    }

    let evaluated: Result<Vec<(String, Value)>, ExprError> = {
        let inputs = ctx.block_inputs(&step.block_id)?;
        let scope = ctx.block_scope(step.block_id);
        let ectx = ExprContext { inputs: &inputs, reader: &scope, foreach: None };
        stmt.args
            .iter()
            .map(|(name, expr)| eval(expr, &ectx).map(|value| (name.clone(), value)))
            .collect()
    };

    match evaluated {
        Ok(values) => {
            for (name, value) in values {
                step.attributes.set_return(name, value);
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
