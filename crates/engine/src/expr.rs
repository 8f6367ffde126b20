// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expression evaluation against an evaluation context.
//!
//! Expressions come from statement arguments, yield arguments, and foreach
//! iterables. The context supplies the enclosing scope's inputs, a reader
//! over completed sibling steps, and an optional foreach binding. Every
//! failure names the offending reference; the state machine surfaces it as
//! a step error.

use af_core::{AttrMap, BinaryOp, Expr, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unknown input '$.{name}'")]
    UnknownInput { name: String },
    #[error("unknown step '{name}'")]
    UnknownStep { name: String },
    #[error("step '{step}' has no attribute '{attr}'")]
    UnknownAttr { step: String, attr: String },
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch { op: BinaryOp, lhs: &'static str, rhs: &'static str },
    #[error("division by zero in '{expr}'")]
    DivisionByZero { expr: String },
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("missing key '{key}'")]
    MissingKey { key: String },
    #[error("cannot index {target} with {index}")]
    BadIndex { target: &'static str, index: &'static str },
    #[error("call to '{function}' is not supported")]
    UnsupportedCall { function: String },
}

/// Read access to the returns of completed sibling steps, by statement
/// name. Incomplete or unknown steps read as `None`.
pub trait StepReader {
    fn step_returns(&self, name: &str) -> Option<AttrMap>;
}

/// A reader over a fixed map, for tests and detached evaluation.
impl StepReader for indexmap::IndexMap<String, AttrMap> {
    fn step_returns(&self, name: &str) -> Option<AttrMap> {
        self.get(name).cloned()
    }
}

/// Evaluation scope for one expression.
pub struct ExprContext<'a> {
    /// `$.name` resolution: the enclosing scope's inputs.
    pub inputs: &'a AttrMap,
    /// `step.attr` resolution.
    pub reader: &'a dyn StepReader,
    /// Foreach loop binding, if evaluating inside a foreach sub-block.
    pub foreach: Option<(&'a str, &'a Value)>,
}

pub fn eval(expr: &Expr, ctx: &ExprContext) -> Result<Value, ExprError> {
    match expr {
        Expr::Lit { value } => Ok(value.clone()),
        Expr::Input { name } => ctx
            .inputs
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownInput { name: name.clone() }),
        Expr::StepRef { step, path } => eval_step_ref(step, path, ctx),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            eval_binary(*op, lhs, rhs, expr)
        }
        Expr::Array { items } => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, ctx)?);
            }
            Ok(Value::Seq(out))
        }
        Expr::Map { entries } => {
            let mut out = indexmap::IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key.clone(), eval(value, ctx)?);
            }
            Ok(Value::Map(out))
        }
        Expr::Index { base, index } => {
            let base = eval(base, ctx)?;
            let index = eval(index, ctx)?;
            eval_index(base, index)
        }
        Expr::Call { function, .. } => {
            Err(ExprError::UnsupportedCall { function: function.clone() })
        }
        Expr::Group { inner } => eval(inner, ctx),
    }
}

fn eval_step_ref(step: &str, path: &[String], ctx: &ExprContext) -> Result<Value, ExprError> {
    // The foreach binding shadows sibling step names.
    if let Some((var, bound)) = ctx.foreach {
        if step == var {
            return navigate((*bound).clone(), step, path);
        }
    }

    let returns = ctx
        .reader
        .step_returns(step)
        .ok_or_else(|| ExprError::UnknownStep { name: step.to_string() })?;
    navigate(Value::Map(returns), step, path)
}

fn navigate(mut current: Value, step: &str, path: &[String]) -> Result<Value, ExprError> {
    for attr in path {
        match current {
            Value::Map(entries) => {
                current = entries.get(attr).cloned().ok_or_else(|| ExprError::UnknownAttr {
                    step: step.to_string(),
                    attr: attr.clone(),
                })?;
            }
            _ => {
                return Err(ExprError::UnknownAttr {
                    step: step.to_string(),
                    attr: attr.clone(),
                })
            }
        }
    }
    Ok(current)
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value, expr: &Expr) -> Result<Value, ExprError> {
    // String + string concatenates; any other mix with strings is an error.
    if op == BinaryOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
    }

    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => eval_int(op, *a, *b, expr),
        (Value::Int(_), Value::Float(_))
        | (Value::Float(_), Value::Int(_))
        | (Value::Float(_), Value::Float(_)) => {
            // Mixed operands promote to floating point.
            let (a, b) = match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(ExprError::TypeMismatch {
                        op,
                        lhs: lhs.type_name(),
                        rhs: rhs.type_name(),
                    })
                }
            };
            eval_float(op, a, b, expr)
        }
        _ => Err(ExprError::TypeMismatch { op, lhs: lhs.type_name(), rhs: rhs.type_name() }),
    }
}

fn eval_int(op: BinaryOp, a: i64, b: i64, expr: &Expr) -> Result<Value, ExprError> {
    let out = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ExprError::DivisionByZero { expr: expr.to_string() });
            }
            a.wrapping_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ExprError::DivisionByZero { expr: expr.to_string() });
            }
            a.wrapping_rem(b)
        }
    };
    Ok(Value::Int(out))
}

fn eval_float(op: BinaryOp, a: f64, b: f64, expr: &Expr) -> Result<Value, ExprError> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
        return Err(ExprError::DivisionByZero { expr: expr.to_string() });
    }
    let out = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
    };
    Ok(Value::Float(out))
}

fn eval_index(base: Value, index: Value) -> Result<Value, ExprError> {
    match (base, index) {
        (Value::Seq(items), Value::Int(i)) => {
            if i < 0 || i as usize >= items.len() {
                return Err(ExprError::IndexOutOfRange { index: i, len: items.len() });
            }
            Ok(items[i as usize].clone())
        }
        (Value::Map(entries), Value::Str(key)) => {
            entries.get(&key).cloned().ok_or(ExprError::MissingKey { key })
        }
        (base, index) => {
            Err(ExprError::BadIndex { target: base.type_name(), index: index.type_name() })
        }
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
