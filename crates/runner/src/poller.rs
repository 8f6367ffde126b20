// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent poller: handlers registered in code, one poll loop.

use crate::{config::RunnerConfig, RunnerError};
use af_core::{
    Clock, LogLevel, LogSource, RunnerDefinition, RunnerId, ServerDefinition, ServerId,
    ServerState, StepLogEntry, SystemClock, TaskDefinition, TaskState, Value,
};
use af_engine::{DispatchError, Engine, ExecOptions, HandlerFn};
use af_storage::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct AgentPoller<C: Clock + 'static = SystemClock> {
    store: Arc<dyn Store>,
    engine: Arc<Engine<C>>,
    config: RunnerConfig,
    clock: C,
    runner_id: RunnerId,
    server_id: ServerId,
    handlers: RwLock<HashMap<String, HandlerFn>>,
    cancel: CancellationToken,
}

impl<C: Clock + 'static> AgentPoller<C> {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<Engine<C>>,
        config: RunnerConfig,
        clock: C,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            clock,
            runner_id: RunnerId::generate(),
            server_id: ServerId::generate(),
            handlers: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Register a handler by facet name.
    pub fn register<F>(&self, facet_name: impl Into<String>, handler: F)
    where
        F: Fn(&af_core::AttrMap) -> Result<af_core::AttrMap, DispatchError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.write().insert(facet_name.into(), Arc::new(handler));
    }

    pub fn handled_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Request a graceful stop; `run` drains in-flight tasks and exits.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register the server record, start the heartbeat, and poll until
    /// stopped.
    pub async fn run(&self) -> Result<(), RunnerError> {
        let names = self.handled_names();
        let now = self.clock.epoch_ms();
        let mut server = ServerDefinition {
            id: self.server_id,
            server_group: "agents".to_string(),
            service_name: "af-runner".to_string(),
            server_name: format!("poller-{}", self.runner_id),
            ips: Vec::new(),
            start_time: now,
            ping_time: now,
            topics: Vec::new(),
            handlers: names.clone(),
            handled: Default::default(),
            state: ServerState::Startup,
            error: None,
        };
        self.store.save_server(&server)?;
        self.store.save_runner(&RunnerDefinition {
            id: self.runner_id,
            name: server.server_name.clone(),
            task_list_name: self.config.task_list_name.clone(),
            status: "running".to_string(),
            handled: Default::default(),
            started_at: now,
        })?;
        server.state = ServerState::Running;
        self.store.save_server(&server)?;
        tracing::info!(server_id = %self.server_id, handlers = names.len(), "poller started");

        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.store),
            self.server_id,
            self.config.heartbeat_interval(),
            self.clock.clone(),
            self.cancel.clone(),
        );
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));

        while !self.cancel.is_cancelled() {
            loop {
                let claimed = self.store.claim_task(
                    &names,
                    &self.config.task_list_name,
                    self.clock.epoch_ms(),
                )?;
                let Some(task) = claimed else { break };

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let handler = self.handlers.read().get(&task.name).map(Arc::clone);
                let job = TaskJob {
                    store: Arc::clone(&self.store),
                    engine: Arc::clone(&self.engine),
                    clock: self.clock.clone(),
                    server_id: self.server_id,
                    timeout: self.config.handler_timeout(),
                    resume_opts: ExecOptions::default().runner_id(self.runner_id),
                };
                tokio::spawn(async move {
                    let _permit = permit;
                    match handler {
                        Some(handler) => job.process(task, handler).await,
                        None => job.reject(task, "no handler registered").await,
                    }
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        // Drain: wait for every permit to come home, bounded by the
        // shutdown timeout.
        let _ = tokio::time::timeout(self.config.shutdown_timeout(), async {
            let _ = semaphore.acquire_many(self.config.max_concurrent as u32).await;
        })
        .await;

        server.state = ServerState::Shutdown;
        server.ping_time = self.clock.epoch_ms();
        self.store.save_server(&server)?;
        let _ = heartbeat.await;
        tracing::info!(server_id = %self.server_id, "poller stopped");
        Ok(())
    }
}

pub(crate) fn spawn_heartbeat<C: Clock + 'static>(
    store: Arc<dyn Store>,
    server_id: ServerId,
    interval: Duration,
    clock: C,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = store.heartbeat_server(&server_id, clock.epoch_ms()) {
                        tracing::warn!(error = %err, "heartbeat failed");
                    }
                }
            }
        }
    })
}

/// One claimed task's execution: dispatch with a timeout, then continue or
/// fail the step and settle the task record. Shared by both runner
/// variants.
pub(crate) struct TaskJob<C: Clock + 'static> {
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine<C>>,
    pub clock: C,
    pub server_id: ServerId,
    pub timeout: Duration,
    pub resume_opts: ExecOptions,
}

impl<C: Clock + 'static> TaskJob<C> {
    pub async fn process(self, task: TaskDefinition, handler: HandlerFn) {
        let mut payload = task.data.clone();
        payload.insert("_facet_name".to_string(), Value::Str(task.name.clone()));

        let call = tokio::task::spawn_blocking(move || handler(&payload));
        let outcome = tokio::time::timeout(self.timeout, call).await;

        match outcome {
            Ok(Ok(Ok(result))) => self.succeed(task, result).await,
            Ok(Ok(Err(err))) => self.reject(task, &err.to_string()).await,
            Ok(Err(join_err)) => {
                self.reject(task, &format!("handler panicked: {}", join_err)).await
            }
            Err(_) => {
                let msg = format!("handler timed out after {:?}", self.timeout);
                self.reject(task, &msg).await
            }
        }
    }

    async fn succeed(self, mut task: TaskDefinition, mut result: af_core::AttrMap) {
        self.persist_handler_logs(&task, &mut result);

        if let Err(err) = self.engine.continue_step(task.step_id, Some(result)) {
            tracing::warn!(step_id = %task.step_id, error = %err, "continue_step failed");
            return;
        }

        task.state = TaskState::Completed;
        task.updated = self.clock.epoch_ms();
        if let Err(err) = self.store.save_task(&task) {
            tracing::warn!(task_id = %task.id, error = %err, "task completion not recorded");
        }
        self.bump_handled(&task.name);

        match self.engine.resume(task.workflow_id, self.resume_opts.clone()) {
            Ok(result) => {
                tracing::debug!(workflow_id = %task.workflow_id, status = %result.status, "resumed")
            }
            Err(err) => tracing::warn!(workflow_id = %task.workflow_id, error = %err, "resume failed"),
        }
    }

    pub(crate) async fn reject(self, mut task: TaskDefinition, message: &str) {
        tracing::warn!(task_id = %task.id, step_id = %task.step_id, error = message, "task failed");
        if let Err(err) = self.engine.fail_step(task.step_id, message) {
            tracing::warn!(step_id = %task.step_id, error = %err, "fail_step failed");
        }
        task.state = TaskState::Failed;
        task.error = Some(message.to_string());
        task.updated = self.clock.epoch_ms();
        if let Err(err) = self.store.save_task(&task) {
            tracing::warn!(task_id = %task.id, error = %err, "task failure not recorded");
        }
    }

    /// Handlers report their own log lines through the reserved `_logs`
    /// return key: a sequence of `{level?, message}` maps, persisted as
    /// handler-sourced step logs.
    fn persist_handler_logs(&self, task: &TaskDefinition, result: &mut af_core::AttrMap) {
        let Some(Value::Seq(lines)) = result.shift_remove("_logs") else {
            return;
        };
        for line in lines {
            let Some(map) = line.as_map() else { continue };
            let Some(message) = map.get("message").and_then(|m| m.as_str()) else {
                continue;
            };
            let level = match map.get("level").and_then(|l| l.as_str()) {
                Some("warning") => LogLevel::Warning,
                Some("error") => LogLevel::Error,
                Some("success") => LogLevel::Success,
                _ => LogLevel::Info,
            };
            let mut entry = StepLogEntry::new(
                task.step_id,
                task.workflow_id,
                LogSource::Handler,
                level,
                message,
                self.clock.epoch_ms(),
            );
            entry.facet_name = task.name.clone();
            entry.runner_id = task.runner_id;
            if let Err(err) = self.store.save_step_log(&entry) {
                tracing::warn!(step_id = %task.step_id, error = %err, "handler log dropped");
            }
        }
    }

    /// Approximate per-facet counters on the server record; last writer
    /// wins.
    fn bump_handled(&self, facet_name: &str) {
        let updated = self
            .store
            .get_server(&self.server_id)
            .ok()
            .flatten()
            .map(|mut server| {
                server.record_handled(facet_name);
                self.store.save_server(&server)
            });
        if let Some(Err(err)) = updated {
            tracing::warn!(error = %err, "handled counter not recorded");
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
