// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The atomic commit unit.

use af_core::{FlowDefinition, StepDefinition, StepLogEntry, TaskDefinition};
use serde::{Deserialize, Serialize};

/// Everything one evaluator iteration wants persisted, applied
/// all-or-nothing by [`Store::commit`](crate::Store::commit).
///
/// Records are upserts keyed by id; committing the same set twice leaves
/// the store unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
    #[serde(default)]
    pub logs: Vec<StepLogEntry>,
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self.tasks.is_empty()
            && self.logs.is_empty()
            && self.flows.is_empty()
    }

    /// Total record count, for commit telemetry.
    pub fn len(&self) -> usize {
        self.steps.len() + self.tasks.len() + self.logs.len() + self.flows.len()
    }

    /// Upsert a step into the pending set, replacing an earlier version of
    /// the same step within this change set.
    pub fn push_step(&mut self, step: StepDefinition) {
        if let Some(existing) = self.steps.iter_mut().find(|s| s.id == step.id) {
            *existing = step;
        } else {
            self.steps.push(step);
        }
    }

    pub fn push_task(&mut self, task: TaskDefinition) {
        if let Some(existing) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            *existing = task;
        } else {
            self.tasks.push(task);
        }
    }

    pub fn push_log(&mut self, entry: StepLogEntry) {
        self.logs.push(entry);
    }

    pub fn push_flow(&mut self, flow: FlowDefinition) {
        if let Some(existing) = self.flows.iter_mut().find(|f| f.id == flow.id) {
            *existing = flow;
        } else {
            self.flows.push(flow);
        }
    }

    /// Fold another change set into this one (later writes win per id).
    pub fn merge(&mut self, other: ChangeSet) {
        for step in other.steps {
            self.push_step(step);
        }
        for task in other.tasks {
            self.push_task(task);
        }
        self.logs.extend(other.logs);
        for flow in other.flows {
            self.push_flow(flow);
        }
    }
}

#[cfg(test)]
#[path = "changes_tests.rs"]
mod tests;
