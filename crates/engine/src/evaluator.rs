// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The iteration engine.
//!
//! One iteration loads every non-terminal step of the workflow, drives each
//! through its state machine in memory, and commits the accumulated change
//! set atomically. The loop ends when the root step is terminal, when a
//! step is parked at `EventTransmit` with nothing else progressing
//! (pause), or when the liveness backstop trips.

use crate::context::IterationCtx;
use crate::dispatch::InlineDispatcher;
use crate::machine;
use crate::EngineError;
use af_core::{
    AttrMap, Clock, FlowId, ProgramAst, RunnerId, StepDefinition, StepId, StepState, WorkflowAst,
    WorkflowId,
};
use af_storage::{ChangeSet, Store};

pub(crate) struct RunParams<'a> {
    pub store: &'a dyn Store,
    pub dispatcher: &'a dyn InlineDispatcher,
    pub workflow: &'a WorkflowAst,
    pub program: &'a ProgramAst,
    pub inputs: &'a AttrMap,
    pub workflow_id: WorkflowId,
    pub flow_id: FlowId,
    pub root_id: StepId,
    pub runner_id: RunnerId,
    pub task_list_name: &'a str,
    pub iteration_cap: usize,
}

pub(crate) enum Outcome {
    Completed { outputs: AttrMap },
    Paused,
    Failed { message: String, step_id: Option<StepId> },
}

#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub iterations: usize,
    pub tasks_created: u64,
}

pub(crate) fn run_iterations<C: Clock>(
    params: RunParams<'_>,
    clock: &C,
) -> Result<(Outcome, RunStats), EngineError> {
    let mut stats = RunStats::default();
    let mut stalled = 0usize;

    for iteration in 1..=params.iteration_cap {
        stats.iterations = iteration;
        let mut ctx = IterationCtx {
            store: params.store,
            dispatcher: params.dispatcher,
            workflow: params.workflow,
            program: params.program,
            inputs: params.inputs,
            workflow_id: params.workflow_id,
            flow_id: params.flow_id,
            runner_id: params.runner_id,
            task_list_name: params.task_list_name,
            now_ms: clock.epoch_ms(),
            changes: ChangeSet::new(),
        };

        let active = params.store.get_active_steps(&params.workflow_id)?;
        let mut progress = false;
        let mut parked = false;

        for mut step in active {
            let loaded_state = step.state;
            // Flags from the previous commit describe the previous
            // iteration; only request_transition (a pending continue) and
            // the error payload carry over.
            step.transition.changed = false;
            step.transition.push_me = false;

            machine::drive(&mut step, &mut ctx)?;

            if step.state != loaded_state || step.transition.changed {
                progress = true;
                ctx.record_step(step.clone());
            }
            if step.state == StepState::EventTransmit
                && !step.transition.request_transition
                && !step.is_terminal()
            {
                parked = true;
            }
        }

        // Steps and tasks created mid-iteration count as progress even when
        // every driven step merely polled.
        if !ctx.changes.is_empty() {
            progress = true;
        }
        stats.tasks_created += ctx.changes.tasks.len() as u64;

        tracing::info!(
            workflow_id = %params.workflow_id,
            iteration,
            steps = ctx.changes.steps.len(),
            tasks = ctx.changes.tasks.len(),
            parked,
            "iteration committed"
        );
        params.store.commit(&ctx.changes)?;

        let root = params
            .store
            .get_step(&params.root_id)?
            .ok_or(EngineError::StepNotFound(params.root_id))?;
        match root.state {
            StepState::StatementComplete => {
                return Ok((Outcome::Completed { outputs: root.attributes.returns }, stats));
            }
            StepState::StatementError => {
                let (message, step_id) = original_failure(params.store, &params.workflow_id, &root)?;
                return Ok((Outcome::Failed { message, step_id }, stats));
            }
            _ => {}
        }

        if progress {
            stalled = 0;
            continue;
        }
        if parked {
            return Ok((Outcome::Paused, stats));
        }
        stalled += 1;
        if stalled >= 2 {
            return Ok((
                Outcome::Failed {
                    message: "dependency stall: no step progressed and none is awaiting an agent"
                        .to_string(),
                    step_id: None,
                },
                stats,
            ));
        }
    }

    Ok((
        Outcome::Failed {
            message: format!("iteration cap {} exceeded", params.iteration_cap),
            step_id: None,
        },
        stats,
    ))
}

/// Failure propagation rewrites messages at every level; report the deepest
/// errored step as the origin.
fn original_failure(
    store: &dyn Store,
    workflow_id: &WorkflowId,
    root: &StepDefinition,
) -> Result<(String, Option<StepId>), EngineError> {
    let steps = store.get_steps_by_workflow(workflow_id)?;
    let errored: Vec<&StepDefinition> =
        steps.iter().filter(|s| s.state == StepState::StatementError).collect();

    let depth_of = |step: &StepDefinition| -> usize {
        let mut depth = 0;
        let mut cursor = step.container_id;
        while !cursor.is_empty() {
            depth += 1;
            match steps.iter().find(|s| s.id == cursor) {
                Some(parent) => cursor = parent.container_id,
                None => break,
            }
        }
        depth
    };

    let origin = errored.iter().max_by_key(|s| depth_of(s)).copied();
    let fallback = root
        .transition
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| "workflow failed".to_string());
    match origin {
        Some(step) => {
            let message = step
                .transition
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or(fallback);
            Ok((message, Some(step.id)))
        }
        None => Ok((fallback, Some(root.id))),
    }
}
