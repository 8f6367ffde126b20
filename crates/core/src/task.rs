// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records — the distribution mechanism between evaluator and agents.
//!
//! Tasks carry the claimable payload; steps remain the domain truth. At
//! most one task per step is `running` at a time, enforced by the store's
//! atomic claim.

use crate::attrs::AttrMap;
use crate::id::{FlowId, RunnerId, StepId, TaskId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Ignored,
    Canceled,
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Ignored => "ignored",
        Canceled => "canceled",
    }
}

/// A claimable work item for an event-facet step parked at `EventTransmit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    /// Qualified facet name; runners claim by matching this against their
    /// handled-name list.
    pub name: String,
    pub step_id: StepId,
    pub workflow_id: WorkflowId,
    #[serde(default = "FlowId::empty")]
    pub flow_id: FlowId,
    /// Runner (or engine caller) that created the task.
    #[serde(default = "RunnerId::empty")]
    pub runner_id: RunnerId,
    pub state: TaskState,
    pub task_list_name: String,
    /// The payload the handler receives: the step's evaluated params.
    #[serde(default)]
    pub data: AttrMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created: u64,
    pub updated: u64,
}

impl TaskDefinition {
    pub fn is_claimable(&self) -> bool {
        self.state == TaskState::Pending
    }
}

crate::builder! {
    pub struct TaskBuilder => TaskDefinition {
        into {
            name: String = "ns.CountDocuments",
            task_list_name: String = "default",
        }
        set {
            id: TaskId = TaskId::generate(),
            step_id: StepId = StepId::generate(),
            workflow_id: WorkflowId = WorkflowId::generate(),
            flow_id: FlowId = FlowId::empty(),
            runner_id: RunnerId = RunnerId::empty(),
            state: TaskState = TaskState::Pending,
            data: AttrMap = AttrMap::new(),
            created: u64 = 0,
            updated: u64 = 0,
        }
        option {
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
