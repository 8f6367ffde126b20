// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing lifecycle operations: execute, resume, continue_step,
//! fail_step, retry_step.
//!
//! Each call builds a fresh execution context; the only state shared across
//! calls lives in persistence (and the in-process AST cache, which is a
//! pure performance shortcut backed by the flow record).

use crate::dispatch::{InlineDispatcher, NullDispatcher};
use crate::evaluator::{self, Outcome, RunParams};
use crate::EngineError;
use af_core::{
    AttrMap, Clock, FlowCounters, FlowDefinition, FlowId, FlowStatus, LogLevel, LogSource,
    ProgramAst, RunnerId, StepDefinition, StepId, StepKind, StepLogEntry, StepState, SystemClock,
    TaskState, WorkflowAst, WorkflowId,
};
use af_storage::{ChangeSet, Store};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Final status of one `execute`/`resume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Paused,
    Error,
}

af_core::simple_display! {
    RunStatus {
        Completed => "COMPLETED",
        Paused => "PAUSED",
        Error => "ERROR",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub message: String,
    /// The step the failure originated from, when attributable.
    pub step_id: Option<StepId>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub workflow_id: WorkflowId,
    /// The root step's returns; present only on `Completed`.
    pub outputs: Option<AttrMap>,
    /// Present only on `Error`.
    pub error: Option<ExecutionError>,
    /// Iterations this call ran; observability only.
    pub iterations: usize,
}

/// Per-call options for `execute` and `resume`.
#[derive(Default, Clone)]
pub struct ExecOptions {
    pub runner_id: Option<RunnerId>,
    pub dispatcher: Option<Arc<dyn InlineDispatcher>>,
    /// ASTs for `resume` when neither the cache nor the flow record has
    /// them (ignored by `execute`).
    pub asts: Option<(WorkflowAst, ProgramAst)>,
}

impl ExecOptions {
    af_core::setters! {
        runner_id: RunnerId,
        dispatcher: Arc<dyn InlineDispatcher>,
        asts: (WorkflowAst, ProgramAst),
    }
}

struct CachedAst {
    workflow: WorkflowAst,
    program: ProgramAst,
}

/// The workflow execution engine.
pub struct Engine<C: Clock = SystemClock> {
    store: Arc<dyn Store>,
    clock: C,
    dispatcher: Arc<dyn InlineDispatcher>,
    task_list_name: String,
    iteration_cap: Option<usize>,
    asts: Mutex<HashMap<WorkflowId, Arc<CachedAst>>>,
}

impl Engine<SystemClock> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            clock: SystemClock,
            dispatcher: Arc::new(NullDispatcher),
            task_list_name: "default".to_string(),
            iteration_cap: None,
            asts: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clock> Engine<C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Engine<C2> {
        Engine {
            store: self.store,
            clock,
            dispatcher: self.dispatcher,
            task_list_name: self.task_list_name,
            iteration_cap: self.iteration_cap,
            asts: self.asts,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn InlineDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_task_list_name(mut self, name: impl Into<String>) -> Self {
        self.task_list_name = name.into();
        self
    }

    /// Hard upper bound on iterations per call. Defaults to
    /// `10 × max(step count, 16)`.
    pub fn with_iteration_cap(mut self, cap: usize) -> Self {
        self.iteration_cap = Some(cap);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Create the root step and run iterations until the workflow
    /// completes, fails, or pauses on external work.
    pub fn execute(
        &self,
        workflow: WorkflowAst,
        program: ProgramAst,
        inputs: AttrMap,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let workflow_id = WorkflowId::generate();
        let now = self.clock.epoch_ms();

        let mut root = StepDefinition::new(StepKind::Workflow, workflow_id, now);
        root.facet_name = workflow.name.clone();
        root.statement_id = "root".to_string();
        root.root_id = root.id;

        let flow = FlowDefinition {
            id: FlowId::generate(),
            workflow_id,
            name: workflow.name.clone(),
            workflow: workflow.clone(),
            program: program.clone(),
            inputs,
            root_step_id: root.id,
            status: FlowStatus::Running,
            counters: FlowCounters::default(),
            created: now,
            updated: now,
        };

        let mut init = ChangeSet::new();
        init.push_step(root);
        init.push_flow(flow);
        self.store.commit(&init)?;

        self.asts
            .lock()
            .insert(workflow_id, Arc::new(CachedAst { workflow, program }));

        tracing::info!(workflow_id = %workflow_id, "execute");
        self.drive(workflow_id, opts)
    }

    /// Re-enter the iteration loop for a paused workflow. Idempotent with
    /// respect to steps that have already advanced.
    pub fn resume(
        &self,
        workflow_id: WorkflowId,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, EngineError> {
        tracing::info!(workflow_id = %workflow_id, "resume");
        self.drive(workflow_id, opts)
    }

    fn drive(
        &self,
        workflow_id: WorkflowId,
        opts: ExecOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let mut flow = self
            .store
            .get_flow_by_workflow(&workflow_id)?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        let cached = self.cached_ast(workflow_id, &opts, &flow);
        let dispatcher = opts.dispatcher.unwrap_or_else(|| Arc::clone(&self.dispatcher));
        let runner_id = opts.runner_id.unwrap_or_else(RunnerId::empty);

        let cap = match self.iteration_cap {
            Some(cap) => cap,
            None => {
                let steps = self.store.get_steps_by_workflow(&workflow_id)?.len();
                10 * steps.max(16)
            }
        };

        let (outcome, stats) = evaluator::run_iterations(
            RunParams {
                store: self.store.as_ref(),
                dispatcher: dispatcher.as_ref(),
                workflow: &cached.workflow,
                program: &cached.program,
                inputs: &flow.inputs,
                workflow_id,
                flow_id: flow.id,
                root_id: flow.root_step_id,
                runner_id,
                task_list_name: &self.task_list_name,
                iteration_cap: cap,
            },
            &self.clock,
        )?;

        // Refresh the flow summary.
        let steps = self.store.get_steps_by_workflow(&workflow_id)?;
        flow.counters = FlowCounters {
            steps_created: steps.len() as u64,
            steps_completed: steps
                .iter()
                .filter(|s| s.state == StepState::StatementComplete)
                .count() as u64,
            tasks_created: flow.counters.tasks_created + stats.tasks_created,
        };
        flow.status = match &outcome {
            Outcome::Completed { .. } => FlowStatus::Completed,
            Outcome::Paused => FlowStatus::Paused,
            Outcome::Failed { .. } => FlowStatus::Error,
        };
        flow.updated = self.clock.epoch_ms();
        self.store.save_flow(&flow)?;

        let result = match outcome {
            Outcome::Completed { outputs } => ExecutionResult {
                status: RunStatus::Completed,
                workflow_id,
                outputs: Some(outputs),
                error: None,
                iterations: stats.iterations,
            },
            Outcome::Paused => ExecutionResult {
                status: RunStatus::Paused,
                workflow_id,
                outputs: None,
                error: None,
                iterations: stats.iterations,
            },
            Outcome::Failed { message, step_id } => ExecutionResult {
                status: RunStatus::Error,
                workflow_id,
                outputs: None,
                error: Some(ExecutionError { message, step_id }),
                iterations: stats.iterations,
            },
        };
        tracing::info!(
            workflow_id = %workflow_id,
            status = %result.status,
            iterations = result.iterations,
            "run finished"
        );
        Ok(result)
    }

    fn cached_ast(
        &self,
        workflow_id: WorkflowId,
        opts: &ExecOptions,
        flow: &FlowDefinition,
    ) -> Arc<CachedAst> {
        let mut cache = self.asts.lock();
        if let Some((workflow, program)) = &opts.asts {
            let entry =
                Arc::new(CachedAst { workflow: workflow.clone(), program: program.clone() });
            cache.insert(workflow_id, Arc::clone(&entry));
            return entry;
        }
        if let Some(entry) = cache.get(&workflow_id) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(CachedAst {
            workflow: flow.workflow.clone(),
            program: flow.program.clone(),
        });
        cache.insert(workflow_id, Arc::clone(&entry));
        entry
    }

    /// Agent success path: merge the result into the step's returns and
    /// request its advance past `EventTransmit`. Returns false (a no-op)
    /// when the step has already advanced.
    pub fn continue_step(
        &self,
        step_id: StepId,
        result: Option<AttrMap>,
    ) -> Result<bool, EngineError> {
        let mut step =
            self.store.get_step(&step_id)?.ok_or(EngineError::StepNotFound(step_id))?;
        if step.state != StepState::EventTransmit || step.transition.request_transition {
            tracing::debug!(step_id = %step_id, state = %step.state, "continue_step is a no-op");
            return Ok(false);
        }

        if let Some(result) = result {
            step.attributes.merge_returns(&result);
        }
        step.transition.request_transition = true;
        step.transition.changed = true;
        step.transition.error = None;
        step.updated = self.clock.epoch_ms();
        self.store.save_step(&step)?;
        tracing::info!(step_id = %step_id, "step continued");
        Ok(true)
    }

    /// Agent failure path: fail the step terminally. Returns false when the
    /// step is not awaiting an agent reply.
    pub fn fail_step(
        &self,
        step_id: StepId,
        error_message: impl Into<String>,
    ) -> Result<bool, EngineError> {
        let mut step =
            self.store.get_step(&step_id)?.ok_or(EngineError::StepNotFound(step_id))?;
        if step.state != StepState::EventTransmit {
            tracing::debug!(step_id = %step_id, state = %step.state, "fail_step is a no-op");
            return Ok(false);
        }

        let message = error_message.into();
        step.fail(message.clone());
        step.updated = self.clock.epoch_ms();
        self.store.save_step(&step)?;

        let mut entry = StepLogEntry::new(
            step.id,
            step.workflow_id,
            LogSource::Framework,
            LogLevel::Error,
            &message,
            self.clock.epoch_ms(),
        );
        entry.facet_name = step.facet_name.clone();
        self.store.save_step_log(&entry)?;
        tracing::info!(step_id = %step_id, error = %message, "step failed by agent");
        Ok(true)
    }

    /// Operator recovery: reset a failed event step back to
    /// `EventTransmit`, re-open its errored ancestors for polling, and
    /// requeue the associated task so an agent may re-claim it.
    pub fn retry_step(&self, step_id: StepId) -> Result<(), EngineError> {
        let mut step =
            self.store.get_step(&step_id)?.ok_or(EngineError::StepNotFound(step_id))?;
        // Only event-capable steps park at EventTransmit; anything else has
        // nothing to requeue.
        if step.state != StepState::StatementError
            || !step.kind.state_table().contains(&StepState::EventTransmit)
        {
            return Err(EngineError::NotRetryable(step_id));
        }
        let now = self.clock.epoch_ms();

        step.state = StepState::EventTransmit;
        step.transition.reset();
        step.updated = now;
        self.store.save_step(&step)?;

        // Failure propagated upward when the run after fail_step observed
        // it; walk the ownership chain and re-open every errored ancestor.
        let mut cursor = step.container_id;
        while !cursor.is_empty() {
            let Some(mut ancestor) = self.store.get_step(&cursor)? else {
                break;
            };
            if ancestor.state == StepState::StatementError {
                ancestor.state = if ancestor.is_block() {
                    StepState::BlockExecutionContinue
                } else {
                    StepState::StatementBlocksContinue
                };
                ancestor.transition.reset();
                ancestor.updated = now;
                self.store.save_step(&ancestor)?;
            }
            cursor = ancestor.container_id;
        }

        if let Some(mut task) = self.store.get_task_for_step(&step_id)? {
            task.state = TaskState::Pending;
            task.error = None;
            task.updated = now;
            self.store.save_task(&task)?;
        }

        if let Some(mut flow) = self.store.get_flow_by_workflow(&step.workflow_id)? {
            flow.status = FlowStatus::Paused;
            flow.updated = now;
            self.store.save_flow(&flow)?;
        }

        tracing::info!(step_id = %step_id, "step reset for retry");
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
