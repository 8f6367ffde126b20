// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The registry runner: handlers resolved from persisted registrations.
//!
//! The handled-name list refreshes periodically from the registration
//! table, optionally narrowed by topic globs. Dispatch goes through a
//! [`RegistryDispatcher`], which the runner also passes to `resume` so
//! multi-step continuations stay in-process instead of round-tripping
//! through the task queue.

use crate::poller::{spawn_heartbeat, TaskJob};
use crate::{config::RunnerConfig, RunnerError};
use af_core::{
    Clock, RunnerDefinition, RunnerId, ServerDefinition, ServerId, ServerState, SystemClock,
};
use af_engine::{
    DispatchError, Engine, ExecOptions, HandlerFn, HandlerModule, InlineDispatcher,
    RegistryDispatcher,
};
use af_storage::Store;
use glob::Pattern;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct RegistryRunner<C: Clock + 'static = SystemClock> {
    store: Arc<dyn Store>,
    engine: Arc<Engine<C>>,
    config: RunnerConfig,
    clock: C,
    runner_id: RunnerId,
    server_id: ServerId,
    dispatcher: Arc<RegistryDispatcher>,
    topics: Vec<Pattern>,
    topic_sources: Vec<String>,
    handled: Arc<RwLock<Vec<String>>>,
    cancel: CancellationToken,
}

impl<C: Clock + 'static> RegistryRunner<C> {
    /// `topics` are glob patterns over facet names; empty means all.
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<Engine<C>>,
        config: RunnerConfig,
        clock: C,
        topics: Vec<String>,
    ) -> Result<Self, RunnerError> {
        let patterns = topics
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|err| RunnerError::Topic {
                    pattern: raw.clone(),
                    message: err.to_string(),
                })
            })
            .collect::<Result<Vec<Pattern>, RunnerError>>()?;

        Ok(Self {
            dispatcher: Arc::new(RegistryDispatcher::new(Arc::clone(&store))),
            store,
            engine,
            config,
            clock,
            runner_id: RunnerId::generate(),
            server_id: ServerId::generate(),
            topics: patterns,
            topic_sources: topics,
            handled: Arc::new(RwLock::new(Vec::new())),
            cancel: CancellationToken::new(),
        })
    }

    pub fn runner_id(&self) -> RunnerId {
        self.runner_id
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Make a handler module addressable by registrations.
    pub fn register_module(&self, uri: impl Into<String>, module: Arc<dyn HandlerModule>) {
        self.dispatcher.register_module(uri, module);
    }

    pub fn dispatcher(&self) -> Arc<RegistryDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn matches_topics(&self, facet_name: &str) -> bool {
        self.topics.is_empty() || self.topics.iter().any(|p| p.matches(facet_name))
    }

    /// Reload the handled-name list from persisted registrations.
    fn refresh(&self) -> Result<Vec<String>, RunnerError> {
        let mut names: Vec<String> = self
            .store
            .list_handler_registrations()?
            .into_iter()
            .map(|reg| reg.facet_name)
            .filter(|name| self.matches_topics(name))
            .collect();
        names.sort();

        let mut handled = self.handled.write();
        if *handled != names {
            tracing::info!(count = names.len(), "handler registrations refreshed");
            *handled = names.clone();
        }
        Ok(names)
    }

    pub async fn run(&self) -> Result<(), RunnerError> {
        let now = self.clock.epoch_ms();
        let names = self.refresh()?;
        let mut server = ServerDefinition {
            id: self.server_id,
            server_group: "agents".to_string(),
            service_name: "af-runner".to_string(),
            server_name: format!("registry-{}", self.runner_id),
            ips: Vec::new(),
            start_time: now,
            ping_time: now,
            topics: self.topic_sources.clone(),
            handlers: names,
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
        tracing::info!(server_id = %self.server_id, "registry runner started");

        let heartbeat = spawn_heartbeat(
            Arc::clone(&self.store),
            self.server_id,
            self.config.heartbeat_interval(),
            self.clock.clone(),
            self.cancel.clone(),
        );
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let refresh_interval =
            std::time::Duration::from_millis(self.config.registry_refresh_interval_ms);
        let mut last_refresh = tokio::time::Instant::now();

        while !self.cancel.is_cancelled() {
            if last_refresh.elapsed() >= refresh_interval {
                if let Err(err) = self.refresh() {
                    tracing::warn!(error = %err, "registration refresh failed");
                }
                last_refresh = tokio::time::Instant::now();
            }

            loop {
                let names = self.handled.read().clone();
                if names.is_empty() {
                    break;
                }
                let claimed = self.store.claim_task(
                    &names,
                    &self.config.task_list_name,
                    self.clock.epoch_ms(),
                )?;
                let Some(task) = claimed else { break };

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let timeout = self
                    .store
                    .get_handler_registration(&task.name)
                    .ok()
                    .flatten()
                    .and_then(|reg| reg.timeout_ms)
                    .map(std::time::Duration::from_millis)
                    .unwrap_or_else(|| self.config.handler_timeout());
                let handler = self.facet_handler(&task.name);
                let job = TaskJob {
                    store: Arc::clone(&self.store),
                    engine: Arc::clone(&self.engine),
                    clock: self.clock.clone(),
                    server_id: self.server_id,
                    timeout,
                    resume_opts: ExecOptions::default()
                        .runner_id(self.runner_id)
                        .dispatcher(Arc::clone(&self.dispatcher) as Arc<dyn InlineDispatcher>),
                };
                tokio::spawn(async move {
                    let _permit = permit;
                    job.process(task, handler).await;
                });
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        let _ = tokio::time::timeout(self.config.shutdown_timeout(), async {
            let _ = semaphore.acquire_many(self.config.max_concurrent as u32).await;
        })
        .await;

        server.state = ServerState::Shutdown;
        server.ping_time = self.clock.epoch_ms();
        self.store.save_server(&server)?;
        let _ = heartbeat.await;
        tracing::info!(server_id = %self.server_id, "registry runner stopped");
        Ok(())
    }

    /// Adapt the registry dispatcher to the per-task handler shape. Missing
    /// registrations and module failures surface as structured dispatch
    /// errors and fail the step.
    fn facet_handler(&self, facet_name: &str) -> HandlerFn {
        let dispatcher = Arc::clone(&self.dispatcher);
        let name = facet_name.to_string();
        Arc::new(move |payload| match dispatcher.dispatch(&name, payload)? {
            Some(result) => Ok(result),
            None => Err(DispatchError::handler(format!("no registration for '{}'", name))),
        })
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
