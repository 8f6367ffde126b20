// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-iteration execution context.
//!
//! Handlers read persistence through this context so that steps and tasks
//! created earlier in the same iteration are visible before the commit:
//! every read overlays the pending change set on top of the store.

use crate::dispatch::InlineDispatcher;
use crate::expr::StepReader;
use crate::EngineError;
use af_core::{
    AttrMap, FlowId, LogLevel, LogSource, ProgramAst, RunnerId, StepDefinition, StepId,
    StepLogEntry, TaskDefinition, Value, WorkflowAst, WorkflowId,
};
use af_storage::{ChangeSet, Store};
use std::collections::BTreeSet;

pub(crate) struct IterationCtx<'a> {
    pub store: &'a dyn Store,
    pub dispatcher: &'a dyn InlineDispatcher,
    pub workflow: &'a WorkflowAst,
    pub program: &'a ProgramAst,
    /// Workflow inputs from the flow record; the root step's `$` scope.
    pub inputs: &'a AttrMap,
    pub workflow_id: WorkflowId,
    pub flow_id: FlowId,
    pub runner_id: RunnerId,
    pub task_list_name: &'a str,
    pub now_ms: u64,
    pub changes: ChangeSet,
}

impl IterationCtx<'_> {
    /// Read one step, pending writes first.
    pub fn read_step(&self, id: &StepId) -> Result<Option<StepDefinition>, EngineError> {
        if let Some(step) = self.changes.steps.iter().find(|s| s.id == *id) {
            return Ok(Some(step.clone()));
        }
        Ok(self.store.get_step(id)?)
    }

    /// Statement steps whose immediate containing block is `block_id`,
    /// with pending writes overlaid, in creation order. Nested block steps
    /// live in the same block but are polled through their container, so
    /// they are excluded here.
    pub fn steps_in_block(&self, block_id: &StepId) -> Result<Vec<StepDefinition>, EngineError> {
        let mut steps = self.store.get_steps_by_block(block_id)?;
        steps.retain(|s| !s.is_block());
        self.overlay(&mut steps, |s| s.block_id == *block_id && !s.is_block());
        Ok(steps)
    }

    /// Block steps owned by `container_id`, with pending writes overlaid.
    pub fn blocks_of(&self, container_id: &StepId) -> Result<Vec<StepDefinition>, EngineError> {
        let mut blocks = self.store.get_blocks_by_step(container_id)?;
        self.overlay(&mut blocks, |s| s.container_id == *container_id && s.is_block());
        Ok(blocks)
    }

    fn overlay(&self, steps: &mut Vec<StepDefinition>, belongs: impl Fn(&StepDefinition) -> bool) {
        for pending in &self.changes.steps {
            if !belongs(pending) {
                continue;
            }
            if let Some(existing) = steps.iter_mut().find(|s| s.id == pending.id) {
                *existing = pending.clone();
            } else {
                steps.push(pending.clone());
            }
        }
    }

    /// Statement ids completed *in persistence* inside a block. Pending
    /// completions deliberately excluded: lazily-created steps (yields) may
    /// only reference committed completions.
    pub fn committed_in_block(&self, block_id: &StepId) -> Result<BTreeSet<String>, EngineError> {
        Ok(self
            .store
            .get_steps_by_block(block_id)?
            .into_iter()
            .filter(|s| !s.is_block() && s.state == af_core::StepState::StatementComplete)
            .map(|s| s.statement_id)
            .collect())
    }

    /// Most recent task for a step, pending writes first.
    pub fn task_for_step(&self, step_id: &StepId) -> Result<Option<TaskDefinition>, EngineError> {
        if let Some(task) = self.changes.tasks.iter().rev().find(|t| t.step_id == *step_id) {
            return Ok(Some(task.clone()));
        }
        Ok(self.store.get_task_for_step(step_id)?)
    }

    /// Queue a step write into the pending change set, stamping `updated`
    /// (and `created` on first write).
    pub fn record_step(&mut self, mut step: StepDefinition) {
        if step.created == 0 {
            step.created = self.now_ms;
        }
        step.updated = self.now_ms;
        self.changes.push_step(step);
    }

    pub fn record_task(&mut self, task: TaskDefinition) {
        self.changes.push_task(task);
    }

    /// Append a framework-sourced step log.
    pub fn log_framework(
        &mut self,
        step: &StepDefinition,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let mut entry = StepLogEntry::new(
            step.id,
            step.workflow_id,
            LogSource::Framework,
            level,
            message,
            self.now_ms,
        );
        entry.facet_name = step.facet_name.clone();
        entry.runner_id = self.runner_id;
        entry.details = details;
        self.changes.push_log(entry);
    }

    /// Reader over completed statements of one block, for expression
    /// evaluation. Returns win over params when both carry a key.
    pub fn block_scope(&self, block_id: StepId) -> BlockScopeReader<'_> {
        BlockScopeReader { ctx: self, block_id }
    }

    /// The `$.name` input scope of a block: the params its container step
    /// carried when the block was created.
    pub fn block_inputs(&self, block_id: &StepId) -> Result<AttrMap, EngineError> {
        if block_id.is_empty() {
            // Root step: inputs come from its own params, which are the
            // workflow inputs; callers pass those directly.
            return Ok(AttrMap::new());
        }
        let block = self
            .read_step(block_id)?
            .ok_or(EngineError::StepNotFound(*block_id))?;
        Ok(block.attributes.params)
    }
}

/// Attribute visibility of a completed step to its siblings: returns,
/// falling back to params for keys no block child produced.
pub(crate) fn visible_attrs(step: &StepDefinition) -> AttrMap {
    let mut out = step.attributes.params.clone();
    for (key, value) in &step.attributes.returns {
        out.insert(key.clone(), value.clone());
    }
    out
}

pub(crate) struct BlockScopeReader<'a> {
    ctx: &'a IterationCtx<'a>,
    block_id: StepId,
}

impl StepReader for BlockScopeReader<'_> {
    fn step_returns(&self, name: &str) -> Option<AttrMap> {
        let steps = self.ctx.steps_in_block(&self.block_id).ok()?;
        steps
            .iter()
            .find(|s| {
                s.statement_id == name && s.state == af_core::StepState::StatementComplete
            })
            .map(visible_attrs)
    }
}
