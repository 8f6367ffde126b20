// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store.
//!
//! A single mutex-guarded shard of ordered maps. Reads clone, writes
//! replace whole records, and the claim/commit primitives are atomic by
//! virtue of the shard lock. This is the reference semantics for every
//! other backend, and the backend of choice for tests and single-process
//! embedding.

use crate::{ChangeSet, Store, StoreError};
use af_core::{
    AttrMap, FlowDefinition, FlowId, HandlerRegistration, Lock, RunnerDefinition, RunnerId,
    ServerDefinition, ServerId, StepDefinition, StepId, StepLogEntry, StepState, TaskDefinition,
    TaskId, TaskState, WorkflowId,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// All persisted records, in insertion order per kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Shard {
    pub(crate) steps: IndexMap<StepId, StepDefinition>,
    pub(crate) tasks: IndexMap<TaskId, TaskDefinition>,
    pub(crate) locks: IndexMap<String, Lock>,
    pub(crate) registrations: IndexMap<String, HandlerRegistration>,
    pub(crate) logs: Vec<StepLogEntry>,
    pub(crate) servers: IndexMap<ServerId, ServerDefinition>,
    pub(crate) flows: IndexMap<FlowId, FlowDefinition>,
    pub(crate) runners: IndexMap<RunnerId, RunnerDefinition>,
}

impl Shard {
    fn running_task_for_step(&self, step_id: &StepId, excluding: &TaskId) -> bool {
        self.tasks
            .values()
            .any(|t| t.step_id == *step_id && t.state == TaskState::Running && t.id != *excluding)
    }

    fn apply_task(&mut self, task: &TaskDefinition) -> Result<(), StoreError> {
        // Partial unique index: at most one running task per step.
        if task.state == TaskState::Running && self.running_task_for_step(&task.step_id, &task.id) {
            return Err(StoreError::RunningTaskConflict { step_id: task.step_id });
        }
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn apply_log(&mut self, entry: &StepLogEntry) {
        // Idempotency: replayed commits must not duplicate log lines.
        if !self.logs.iter().any(|l| l.id == entry.id) {
            self.logs.push(entry.clone());
        }
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<(), StoreError> {
        for step in &changes.steps {
            self.steps.insert(step.id, step.clone());
        }
        for task in &changes.tasks {
            self.apply_task(task)?;
        }
        for entry in &changes.logs {
            self.apply_log(entry);
        }
        for flow in &changes.flows {
            self.flows.insert(flow.id, flow.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    shard: Mutex<Shard>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail without applying anything. Exercises
    /// callers' all-or-nothing handling.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn export_shard(&self) -> Shard {
        self.shard.lock().clone()
    }

    /// Journal replay: install a lock record verbatim.
    pub(crate) fn put_lock(&self, lock: Lock) {
        self.shard.lock().locks.insert(lock.key.clone(), lock);
    }

    pub(crate) fn import_shard(&self, shard: Shard) {
        *self.shard.lock() = shard;
    }
}

impl Store for MemoryStore {
    fn save_step(&self, step: &StepDefinition) -> Result<(), StoreError> {
        self.shard.lock().steps.insert(step.id, step.clone());
        Ok(())
    }

    fn get_step(&self, id: &StepId) -> Result<Option<StepDefinition>, StoreError> {
        Ok(self.shard.lock().steps.get(id).cloned())
    }

    fn get_steps_by_block(&self, block_id: &StepId) -> Result<Vec<StepDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.steps.values().filter(|s| s.block_id == *block_id).cloned().collect())
    }

    fn get_steps_by_state(&self, state: StepState) -> Result<Vec<StepDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.steps.values().filter(|s| s.state == state).cloned().collect())
    }

    fn get_blocks_by_step(&self, step_id: &StepId) -> Result<Vec<StepDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard
            .steps
            .values()
            .filter(|s| s.container_id == *step_id && s.is_block())
            .cloned()
            .collect())
    }

    fn get_active_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard
            .steps
            .values()
            .filter(|s| s.workflow_id == *workflow_id && !s.is_terminal())
            .cloned()
            .collect())
    }

    fn get_steps_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.steps.values().filter(|s| s.workflow_id == *workflow_id).cloned().collect())
    }

    fn save_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        self.shard.lock().apply_task(task)
    }

    fn get_task(&self, id: &TaskId) -> Result<Option<TaskDefinition>, StoreError> {
        Ok(self.shard.lock().tasks.get(id).cloned())
    }

    fn get_task_for_step(&self, step_id: &StepId) -> Result<Option<TaskDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.tasks.values().rev().find(|t| t.step_id == *step_id).cloned())
    }

    fn claim_task(
        &self,
        candidate_names: &[String],
        task_list_name: &str,
        now_ms: u64,
    ) -> Result<Option<TaskDefinition>, StoreError> {
        let mut shard = self.shard.lock();
        let claimed_id = shard.tasks.values().find_map(|t| {
            let matches = t.state == TaskState::Pending
                && t.task_list_name == task_list_name
                && candidate_names.iter().any(|n| *n == t.name);
            (matches && !shard.running_task_for_step(&t.step_id, &t.id)).then_some(t.id)
        });

        let Some(id) = claimed_id else {
            return Ok(None);
        };
        match shard.tasks.get_mut(&id) {
            Some(task) => {
                task.state = TaskState::Running;
                task.updated = now_ms;
                tracing::debug!(task_id = %task.id, name = %task.name, "task claimed");
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected failure".to_string()));
        }

        let mut shard = self.shard.lock();
        // Stage on a scratch copy so a validation failure leaves nothing
        // applied.
        let mut staged = shard.clone();
        staged.apply(changes)?;
        *shard = staged;
        tracing::debug!(
            steps = changes.steps.len(),
            tasks = changes.tasks.len(),
            logs = changes.logs.len(),
            "commit applied"
        );
        Ok(())
    }

    fn acquire_lock(
        &self,
        key: &str,
        duration_ms: u64,
        metadata: Option<AttrMap>,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut shard = self.shard.lock();
        if let Some(existing) = shard.locks.get(key) {
            if !existing.is_expired(now_ms) {
                return Ok(false);
            }
        }
        shard.locks.insert(
            key.to_string(),
            Lock {
                key: key.to_string(),
                acquired_at: now_ms,
                expires_at: now_ms + duration_ms,
                metadata: metadata.unwrap_or_default(),
            },
        );
        Ok(true)
    }

    fn extend_lock(&self, key: &str, duration_ms: u64, now_ms: u64) -> Result<bool, StoreError> {
        let mut shard = self.shard.lock();
        match shard.locks.get_mut(key) {
            Some(lock) if !lock.is_expired(now_ms) => {
                lock.expires_at = now_ms + duration_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn release_lock(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.shard.lock().locks.shift_remove(key).is_some())
    }

    fn get_lock(&self, key: &str) -> Result<Option<Lock>, StoreError> {
        Ok(self.shard.lock().locks.get(key).cloned())
    }

    fn save_handler_registration(&self, reg: &HandlerRegistration) -> Result<(), StoreError> {
        self.shard.lock().registrations.insert(reg.facet_name.clone(), reg.clone());
        Ok(())
    }

    fn get_handler_registration(
        &self,
        facet_name: &str,
    ) -> Result<Option<HandlerRegistration>, StoreError> {
        Ok(self.shard.lock().registrations.get(facet_name).cloned())
    }

    fn list_handler_registrations(&self) -> Result<Vec<HandlerRegistration>, StoreError> {
        Ok(self.shard.lock().registrations.values().cloned().collect())
    }

    fn delete_handler_registration(&self, facet_name: &str) -> Result<bool, StoreError> {
        Ok(self.shard.lock().registrations.shift_remove(facet_name).is_some())
    }

    fn save_step_log(&self, entry: &StepLogEntry) -> Result<(), StoreError> {
        self.shard.lock().apply_log(entry);
        Ok(())
    }

    fn get_step_logs_by_step(&self, step_id: &StepId) -> Result<Vec<StepLogEntry>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.logs.iter().filter(|l| l.step_id == *step_id).cloned().collect())
    }

    fn get_step_logs_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepLogEntry>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.logs.iter().filter(|l| l.workflow_id == *workflow_id).cloned().collect())
    }

    fn save_server(&self, server: &ServerDefinition) -> Result<(), StoreError> {
        self.shard.lock().servers.insert(server.id, server.clone());
        Ok(())
    }

    fn get_server(&self, id: &ServerId) -> Result<Option<ServerDefinition>, StoreError> {
        Ok(self.shard.lock().servers.get(id).cloned())
    }

    fn list_servers(&self) -> Result<Vec<ServerDefinition>, StoreError> {
        Ok(self.shard.lock().servers.values().cloned().collect())
    }

    fn heartbeat_server(&self, id: &ServerId, ping_ms: u64) -> Result<bool, StoreError> {
        let mut shard = self.shard.lock();
        match shard.servers.get_mut(id) {
            Some(server) => {
                server.ping_time = ping_ms;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_server(&self, id: &ServerId) -> Result<bool, StoreError> {
        Ok(self.shard.lock().servers.shift_remove(id).is_some())
    }

    fn save_flow(&self, flow: &FlowDefinition) -> Result<(), StoreError> {
        self.shard.lock().flows.insert(flow.id, flow.clone());
        Ok(())
    }

    fn get_flow(&self, id: &FlowId) -> Result<Option<FlowDefinition>, StoreError> {
        Ok(self.shard.lock().flows.get(id).cloned())
    }

    fn get_flow_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<FlowDefinition>, StoreError> {
        let shard = self.shard.lock();
        Ok(shard.flows.values().find(|f| f.workflow_id == *workflow_id).cloned())
    }

    fn save_runner(&self, runner: &RunnerDefinition) -> Result<(), StoreError> {
        self.shard.lock().runners.insert(runner.id, runner.clone());
        Ok(())
    }

    fn get_runner(&self, id: &RunnerId) -> Result<Option<RunnerDefinition>, StoreError> {
        Ok(self.shard.lock().runners.get(id).cloned())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
