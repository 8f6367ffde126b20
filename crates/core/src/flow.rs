// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow and runner aggregate records.
//!
//! These exist for observability and for resuming by persistent handle;
//! they never encode semantics beyond what the step graph already holds.

use crate::ast::{ProgramAst, WorkflowAst};
use crate::attrs::AttrMap;
use crate::id::{FlowId, RunnerId, StepId, WorkflowId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Running,
    Paused,
    Completed,
    Error,
}

crate::simple_display! {
    FlowStatus {
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Error => "error",
    }
}

/// Summary counters maintained on the flow record at commit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCounters {
    #[serde(default)]
    pub steps_created: u64,
    #[serde(default)]
    pub steps_completed: u64,
    #[serde(default)]
    pub tasks_created: u64,
}

/// Snapshot of one workflow execution: the ASTs, the inputs, and summary
/// state. `resume` recovers a missing AST cache entry from this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: FlowId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub workflow: WorkflowAst,
    pub program: ProgramAst,
    #[serde(default)]
    pub inputs: AttrMap,
    /// Root workflow step, so `resume` can find the tree without a scan.
    pub root_step_id: StepId,
    pub status: FlowStatus,
    #[serde(default)]
    pub counters: FlowCounters,
    pub created: u64,
    pub updated: u64,
}

/// Observability record for a long-lived runner process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerDefinition {
    pub id: RunnerId,
    #[serde(default)]
    pub name: String,
    pub task_list_name: String,
    /// "running" or "stopped".
    pub status: String,
    #[serde(default)]
    pub handled: IndexMap<String, u64>,
    pub started_at: u64,
}
