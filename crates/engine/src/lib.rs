// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The AgentFlow workflow execution engine.
//!
//! A dependency-driven iterative evaluator: each iteration advances every
//! eligible step through its state machine in memory, accumulates the
//! resulting mutations into one change set, and commits it atomically. A
//! step that calls an event facet parks at `EventTransmit` and the run
//! pauses; external agents claim the emitted task, reply through
//! [`Engine::continue_step`] / [`Engine::fail_step`], and re-enter the loop
//! with [`Engine::resume`].

mod context;
mod evaluator;
mod machine;

pub mod dispatch;
pub mod expr;
pub mod graph;
pub mod lifecycle;

pub use dispatch::{
    CompositeDispatcher, DispatchError, FnDispatcher, HandlerFn, HandlerModule, InlineDispatcher,
    MapModule, NullDispatcher, RegistryDispatcher,
};
pub use expr::{eval, ExprContext, ExprError, StepReader};
pub use graph::DepGraph;
pub use lifecycle::{Engine, ExecOptions, ExecutionError, ExecutionResult, RunStatus};

use af_core::{StepId, WorkflowId};
use thiserror::Error;

/// Infrastructure-level engine failures.
///
/// Domain failures (expression errors, handler errors) never surface here;
/// they fail the owning step and the run reports `ERROR` through
/// [`ExecutionResult`]. Everything in this enum is safe to retry.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] af_storage::StoreError),
    #[error("workflow {0} has no flow record and no cached AST")]
    MissingAst(WorkflowId),
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),
    #[error("step {0} not found")]
    StepNotFound(StepId),
    #[error("step {0} is not in a retryable state")]
    NotRetryable(StepId),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}
