// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner processes: long-lived agents that poll the task queue, claim
//! pending tasks atomically, execute handlers, and feed results back into
//! the engine via `continue_step`/`fail_step` + `resume`.
//!
//! Two variants exist: [`AgentPoller`] with handlers registered in code,
//! and [`RegistryRunner`] with handlers resolved from persisted
//! registrations, refreshed periodically and filtered by topic globs.

pub mod config;
pub mod lease;
pub mod poller;
pub mod registry;

pub use config::RunnerConfig;
pub use lease::LockLease;
pub use poller::AgentPoller;
pub use registry::RegistryRunner;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] af_storage::StoreError),
    #[error(transparent)]
    Engine(#[from] af_engine::EngineError),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("invalid topic glob '{pattern}': {message}")]
    Topic { pattern: String, message: String },
}
