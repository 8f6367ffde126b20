// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner configuration.
//!
//! Every knob has a safe default. Values load from a TOML document and may
//! then be overridden by `AF_*` environment variables.

use crate::RunnerError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Task list this runner claims from.
    pub task_list_name: String,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Bounded handler-dispatch pool size.
    pub max_concurrent: usize,
    /// How often a registry runner re-reads handler registrations.
    pub registry_refresh_interval_ms: u64,
    /// Lease duration for per-task advisory locks.
    pub lock_duration_ms: u64,
    pub lock_extend_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Fallback handler timeout; a registration's `timeout_ms` wins.
    pub handler_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            task_list_name: "default".to_string(),
            poll_interval_ms: 500,
            heartbeat_interval_ms: 5_000,
            max_concurrent: 4,
            registry_refresh_interval_ms: 10_000,
            lock_duration_ms: 30_000,
            lock_extend_interval_ms: 10_000,
            shutdown_timeout_ms: 5_000,
            handler_timeout_ms: 60_000,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, RunnerError> {
        Ok(toml::from_str::<RunnerConfig>(raw)?.with_env_overrides())
    }

    /// Apply `AF_*` environment overrides on top of the current values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("AF_TASK_LIST") {
            if !name.is_empty() {
                self.task_list_name = name;
            }
        }
        env_ms("AF_POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        env_ms("AF_HEARTBEAT_INTERVAL_MS", &mut self.heartbeat_interval_ms);
        if let Some(n) = env_parse::<usize>("AF_MAX_CONCURRENT") {
            self.max_concurrent = n.max(1);
        }
        env_ms("AF_REGISTRY_REFRESH_INTERVAL_MS", &mut self.registry_refresh_interval_ms);
        env_ms("AF_LOCK_DURATION_MS", &mut self.lock_duration_ms);
        env_ms("AF_LOCK_EXTEND_INTERVAL_MS", &mut self.lock_extend_interval_ms);
        env_ms("AF_SHUTDOWN_TIMEOUT_MS", &mut self.shutdown_timeout_ms);
        env_ms("AF_HANDLER_TIMEOUT_MS", &mut self.handler_timeout_ms);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_ms(key: &str, target: &mut u64) {
    if let Some(ms) = env_parse::<u64>(key) {
        *target = ms;
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
