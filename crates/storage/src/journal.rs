// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable journaled store.
//!
//! Wraps the in-memory shard with an append-only JSON-lines journal.
//! Every mutation is journaled as the record it produced, so replay is a
//! sequence of idempotent upserts. `compact` writes a zstd-compressed
//! snapshot and truncates the journal; `open` loads the snapshot and
//! replays the tail. A torn final line (crash mid-write) is tolerated:
//! replay stops at the first malformed line.

use crate::memory::MemoryStore;
use crate::{ChangeSet, Store, StoreError};
use af_core::{
    AttrMap, FlowDefinition, FlowId, HandlerRegistration, Lock, RunnerDefinition, RunnerId,
    ServerDefinition, ServerId, StepDefinition, StepId, StepLogEntry, StepState, TaskDefinition,
    TaskId, WorkflowId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One journaled mutation. Records carry the produced state, never the
/// operation inputs, which keeps replay a plain upsert stream.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalRecord {
    Step { step: StepDefinition },
    Task { task: TaskDefinition },
    Commit { changes: ChangeSet },
    Lock { lock: Lock },
    Unlock { key: String },
    Registration { registration: HandlerRegistration },
    DropRegistration { facet_name: String },
    Log { entry: StepLogEntry },
    Server { server: ServerDefinition },
    Ping { id: ServerId, ping_ms: u64 },
    DropServer { id: ServerId },
    Flow { flow: FlowDefinition },
    Runner { runner: RunnerDefinition },
}

pub struct JournalStore {
    inner: MemoryStore,
    /// Guards both journal order and its consistency with the in-memory
    /// application order.
    journal: Mutex<File>,
    journal_path: PathBuf,
    snapshot_path: PathBuf,
}

impl JournalStore {
    /// Open (or create) a journaled store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let journal_path = dir.join("store.journal");
        let snapshot_path = dir.join("store.snap.zst");

        let inner = MemoryStore::new();
        if snapshot_path.exists() {
            let raw = std::fs::read(&snapshot_path)?;
            let bytes = zstd::decode_all(raw.as_slice())?;
            inner.import_shard(serde_json::from_slice(&bytes)?);
            tracing::info!(path = %snapshot_path.display(), "snapshot loaded");
        }

        if journal_path.exists() {
            let mut replayed = 0usize;
            let reader = BufReader::new(File::open(&journal_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let record: JournalRecord = match serde_json::from_str(&line) {
                    Ok(record) => record,
                    Err(err) => {
                        // Torn tail from a crash mid-append.
                        tracing::warn!(error = %err, replayed, "journal replay stopped at malformed line");
                        break;
                    }
                };
                Self::replay(&inner, record)?;
                replayed += 1;
            }
            tracing::info!(replayed, path = %journal_path.display(), "journal replayed");
        }

        let file = OpenOptions::new().create(true).append(true).open(&journal_path)?;
        Ok(Self { inner, journal: Mutex::new(file), journal_path, snapshot_path })
    }

    fn replay(inner: &MemoryStore, record: JournalRecord) -> Result<(), StoreError> {
        match record {
            JournalRecord::Step { step } => inner.save_step(&step),
            JournalRecord::Task { task } => inner.save_task(&task),
            JournalRecord::Commit { changes } => inner.commit(&changes),
            JournalRecord::Lock { lock } => {
                inner.put_lock(lock);
                Ok(())
            }
            JournalRecord::Unlock { key } => {
                inner.release_lock(&key)?;
                Ok(())
            }
            JournalRecord::Registration { registration } => {
                inner.save_handler_registration(&registration)
            }
            JournalRecord::DropRegistration { facet_name } => {
                inner.delete_handler_registration(&facet_name)?;
                Ok(())
            }
            JournalRecord::Log { entry } => inner.save_step_log(&entry),
            JournalRecord::Server { server } => inner.save_server(&server),
            JournalRecord::Ping { id, ping_ms } => {
                inner.heartbeat_server(&id, ping_ms)?;
                Ok(())
            }
            JournalRecord::DropServer { id } => {
                inner.delete_server(&id)?;
                Ok(())
            }
            JournalRecord::Flow { flow } => inner.save_flow(&flow),
            JournalRecord::Runner { runner } => inner.save_runner(&runner),
        }
    }

    fn append_locked(&self, file: &mut File, record: &JournalRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Run `op` against the in-memory shard and journal `record` on
    /// success, holding the journal lock across both so journal order
    /// matches application order.
    fn write<T>(
        &self,
        op: impl FnOnce(&MemoryStore) -> Result<T, StoreError>,
        record: impl FnOnce(&T) -> Option<JournalRecord>,
    ) -> Result<T, StoreError> {
        let mut file = self.journal.lock();
        let out = op(&self.inner)?;
        if let Some(record) = record(&out) {
            self.append_locked(&mut file, &record)?;
        }
        Ok(out)
    }

    /// Write a compressed snapshot of the full shard and truncate the
    /// journal. Safe to call at any quiesce point; a crash between the
    /// snapshot rename and the truncate only makes replay redundant, never
    /// wrong.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut file = self.journal.lock();
        let shard = self.inner.export_shard();
        let bytes = serde_json::to_vec(&shard)?;
        let compressed = zstd::encode_all(bytes.as_slice(), 0)?;

        let tmp = self.snapshot_path.with_extension("zst.tmp");
        std::fs::write(&tmp, &compressed)?;
        std::fs::rename(&tmp, &self.snapshot_path)?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        tracing::info!(
            path = %self.journal_path.display(),
            snapshot_bytes = compressed.len(),
            "journal compacted"
        );
        Ok(())
    }
}

impl Store for JournalStore {
    fn save_step(&self, step: &StepDefinition) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_step(step),
            |_| Some(JournalRecord::Step { step: step.clone() }),
        )
    }

    fn get_step(&self, id: &StepId) -> Result<Option<StepDefinition>, StoreError> {
        self.inner.get_step(id)
    }

    fn get_steps_by_block(&self, block_id: &StepId) -> Result<Vec<StepDefinition>, StoreError> {
        self.inner.get_steps_by_block(block_id)
    }

    fn get_steps_by_state(&self, state: StepState) -> Result<Vec<StepDefinition>, StoreError> {
        self.inner.get_steps_by_state(state)
    }

    fn get_blocks_by_step(&self, step_id: &StepId) -> Result<Vec<StepDefinition>, StoreError> {
        self.inner.get_blocks_by_step(step_id)
    }

    fn get_active_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<StepDefinition>, StoreError> {
        self.inner.get_active_steps(workflow_id)
    }

    fn get_steps_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepDefinition>, StoreError> {
        self.inner.get_steps_by_workflow(workflow_id)
    }

    fn save_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_task(task),
            |_| Some(JournalRecord::Task { task: task.clone() }),
        )
    }

    fn get_task(&self, id: &TaskId) -> Result<Option<TaskDefinition>, StoreError> {
        self.inner.get_task(id)
    }

    fn get_task_for_step(&self, step_id: &StepId) -> Result<Option<TaskDefinition>, StoreError> {
        self.inner.get_task_for_step(step_id)
    }

    fn claim_task(
        &self,
        candidate_names: &[String],
        task_list_name: &str,
        now_ms: u64,
    ) -> Result<Option<TaskDefinition>, StoreError> {
        self.write(
            |inner| inner.claim_task(candidate_names, task_list_name, now_ms),
            |claimed| claimed.as_ref().map(|task| JournalRecord::Task { task: task.clone() }),
        )
    }

    fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        self.write(
            |inner| inner.commit(changes),
            |_| Some(JournalRecord::Commit { changes: changes.clone() }),
        )
    }

    fn acquire_lock(
        &self,
        key: &str,
        duration_ms: u64,
        metadata: Option<AttrMap>,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        self.write(
            |inner| {
                let acquired = inner.acquire_lock(key, duration_ms, metadata, now_ms)?;
                Ok(acquired.then(|| inner.get_lock(key)).transpose()?.flatten())
            },
            |lock| lock.clone().map(|lock| JournalRecord::Lock { lock }),
        )
        .map(|lock| lock.is_some())
    }

    fn extend_lock(&self, key: &str, duration_ms: u64, now_ms: u64) -> Result<bool, StoreError> {
        self.write(
            |inner| {
                let extended = inner.extend_lock(key, duration_ms, now_ms)?;
                Ok(extended.then(|| inner.get_lock(key)).transpose()?.flatten())
            },
            |lock| lock.clone().map(|lock| JournalRecord::Lock { lock }),
        )
        .map(|lock| lock.is_some())
    }

    fn release_lock(&self, key: &str) -> Result<bool, StoreError> {
        self.write(
            |inner| inner.release_lock(key),
            |released| released.then(|| JournalRecord::Unlock { key: key.to_string() }),
        )
    }

    fn get_lock(&self, key: &str) -> Result<Option<Lock>, StoreError> {
        self.inner.get_lock(key)
    }

    fn save_handler_registration(&self, reg: &HandlerRegistration) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_handler_registration(reg),
            |_| Some(JournalRecord::Registration { registration: reg.clone() }),
        )
    }

    fn get_handler_registration(
        &self,
        facet_name: &str,
    ) -> Result<Option<HandlerRegistration>, StoreError> {
        self.inner.get_handler_registration(facet_name)
    }

    fn list_handler_registrations(&self) -> Result<Vec<HandlerRegistration>, StoreError> {
        self.inner.list_handler_registrations()
    }

    fn delete_handler_registration(&self, facet_name: &str) -> Result<bool, StoreError> {
        self.write(
            |inner| inner.delete_handler_registration(facet_name),
            |deleted| {
                deleted.then(|| JournalRecord::DropRegistration {
                    facet_name: facet_name.to_string(),
                })
            },
        )
    }

    fn save_step_log(&self, entry: &StepLogEntry) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_step_log(entry),
            |_| Some(JournalRecord::Log { entry: entry.clone() }),
        )
    }

    fn get_step_logs_by_step(&self, step_id: &StepId) -> Result<Vec<StepLogEntry>, StoreError> {
        self.inner.get_step_logs_by_step(step_id)
    }

    fn get_step_logs_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<StepLogEntry>, StoreError> {
        self.inner.get_step_logs_by_workflow(workflow_id)
    }

    fn save_server(&self, server: &ServerDefinition) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_server(server),
            |_| Some(JournalRecord::Server { server: server.clone() }),
        )
    }

    fn get_server(&self, id: &ServerId) -> Result<Option<ServerDefinition>, StoreError> {
        self.inner.get_server(id)
    }

    fn list_servers(&self) -> Result<Vec<ServerDefinition>, StoreError> {
        self.inner.list_servers()
    }

    fn heartbeat_server(&self, id: &ServerId, ping_ms: u64) -> Result<bool, StoreError> {
        self.write(
            |inner| inner.heartbeat_server(id, ping_ms),
            |updated| updated.then_some(JournalRecord::Ping { id: *id, ping_ms }),
        )
    }

    fn delete_server(&self, id: &ServerId) -> Result<bool, StoreError> {
        self.write(
            |inner| inner.delete_server(id),
            |deleted| deleted.then_some(JournalRecord::DropServer { id: *id }),
        )
    }

    fn save_flow(&self, flow: &FlowDefinition) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_flow(flow),
            |_| Some(JournalRecord::Flow { flow: flow.clone() }),
        )
    }

    fn get_flow(&self, id: &FlowId) -> Result<Option<FlowDefinition>, StoreError> {
        self.inner.get_flow(id)
    }

    fn get_flow_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<FlowDefinition>, StoreError> {
        self.inner.get_flow_by_workflow(workflow_id)
    }

    fn save_runner(&self, runner: &RunnerDefinition) -> Result<(), StoreError> {
        self.write(
            |inner| inner.save_runner(runner),
            |_| Some(JournalRecord::Runner { runner: runner.clone() }),
        )
    }

    fn get_runner(&self, id: &RunnerId) -> Result<Option<RunnerDefinition>, StoreError> {
        self.inner.get_runner(id)
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
