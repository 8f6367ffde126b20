// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence contract for the AgentFlow runtime.
//!
//! The [`Store`] trait is the boundary every backend implements: step and
//! task CRUD, the atomic task claim, the atomic iteration commit, advisory
//! locks, handler registrations, step logs, and the server registry. Two
//! backends live here: [`MemoryStore`] for tests and embedding, and
//! [`JournalStore`] for durable single-node deployments.
//!
//! Every read returns an independent copy — callers can never mutate
//! persisted state through a returned value. Every write is idempotent so
//! that journal replay and repeated commits are safe.

mod changes;
mod memory;

pub mod journal;

pub use changes::ChangeSet;
pub use journal::JournalStore;
pub use memory::MemoryStore;

use af_core::{
    AttrMap, FlowDefinition, FlowId, HandlerRegistration, Lock, RunnerDefinition, RunnerId,
    ServerDefinition, ServerId, StepDefinition, StepId, StepLogEntry, StepState, TaskDefinition,
    TaskId, WorkflowId,
};
use thiserror::Error;

/// Errors surfaced by persistence backends.
///
/// Infrastructure failures are surfaced to the caller as-is; retrying the
/// failed operation is always safe.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("a running task already exists for step {step_id}")]
    RunningTaskConflict { step_id: StepId },
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The persistence contract shared by the evaluator and the runners.
///
/// Time never comes from the store: operations that stamp or compare
/// wall-clock time take an explicit `now_ms`, so backends stay
/// deterministic under test clocks.
pub trait Store: Send + Sync {
    // === Steps ===
    fn save_step(&self, step: &StepDefinition) -> Result<(), StoreError>;
    fn get_step(&self, id: &StepId) -> Result<Option<StepDefinition>, StoreError>;
    /// Steps whose immediate containing block is `block_id`, in creation order.
    fn get_steps_by_block(&self, block_id: &StepId) -> Result<Vec<StepDefinition>, StoreError>;
    /// All steps in the given state, across workflows.
    fn get_steps_by_state(&self, state: StepState) -> Result<Vec<StepDefinition>, StoreError>;
    /// Block steps owned by `step_id`, in creation order.
    fn get_blocks_by_step(&self, step_id: &StepId) -> Result<Vec<StepDefinition>, StoreError>;
    /// Non-terminal steps of one workflow, in creation order. The iteration
    /// engine's working set.
    fn get_active_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepDefinition>, StoreError>;
    /// Every step of one workflow, in creation order.
    fn get_steps_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepDefinition>, StoreError>;

    // === Tasks ===
    fn save_task(&self, task: &TaskDefinition) -> Result<(), StoreError>;
    fn get_task(&self, id: &TaskId) -> Result<Option<TaskDefinition>, StoreError>;
    /// The most recently created task for a step, if any.
    fn get_task_for_step(&self, step_id: &StepId) -> Result<Option<TaskDefinition>, StoreError>;
    /// Atomically claim one pending task whose name is in `candidate_names`
    /// and whose list matches. The claimed task transitions to `running`;
    /// two concurrent callers never receive the same task, and a step with
    /// a task already running is skipped.
    fn claim_task(
        &self,
        candidate_names: &[String],
        task_list_name: &str,
        now_ms: u64,
    ) -> Result<Option<TaskDefinition>, StoreError>;

    // === Atomic iteration commit ===
    /// Apply a full change set all-or-nothing. Safe to repeat.
    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError>;

    // === Advisory locks ===
    fn acquire_lock(
        &self,
        key: &str,
        duration_ms: u64,
        metadata: Option<AttrMap>,
        now_ms: u64,
    ) -> Result<bool, StoreError>;
    fn extend_lock(&self, key: &str, duration_ms: u64, now_ms: u64) -> Result<bool, StoreError>;
    fn release_lock(&self, key: &str) -> Result<bool, StoreError>;
    fn get_lock(&self, key: &str) -> Result<Option<Lock>, StoreError>;

    // === Handler registrations ===
    fn save_handler_registration(&self, reg: &HandlerRegistration) -> Result<(), StoreError>;
    fn get_handler_registration(
        &self,
        facet_name: &str,
    ) -> Result<Option<HandlerRegistration>, StoreError>;
    fn list_handler_registrations(&self) -> Result<Vec<HandlerRegistration>, StoreError>;
    fn delete_handler_registration(&self, facet_name: &str) -> Result<bool, StoreError>;

    // === Step logs ===
    fn save_step_log(&self, entry: &StepLogEntry) -> Result<(), StoreError>;
    fn get_step_logs_by_step(&self, step_id: &StepId) -> Result<Vec<StepLogEntry>, StoreError>;
    fn get_step_logs_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepLogEntry>, StoreError>;

    // === Server registry ===
    fn save_server(&self, server: &ServerDefinition) -> Result<(), StoreError>;
    fn get_server(&self, id: &ServerId) -> Result<Option<ServerDefinition>, StoreError>;
    fn list_servers(&self) -> Result<Vec<ServerDefinition>, StoreError>;
    fn heartbeat_server(&self, id: &ServerId, ping_ms: u64) -> Result<bool, StoreError>;
    fn delete_server(&self, id: &ServerId) -> Result<bool, StoreError>;

    // === Flows and runners ===
    fn save_flow(&self, flow: &FlowDefinition) -> Result<(), StoreError>;
    fn get_flow(&self, id: &FlowId) -> Result<Option<FlowDefinition>, StoreError>;
    fn get_flow_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<FlowDefinition>, StoreError>;
    fn save_runner(&self, runner: &RunnerDefinition) -> Result<(), StoreError>;
    fn get_runner(&self, id: &RunnerId) -> Result<Option<RunnerDefinition>, StoreError>;
}
