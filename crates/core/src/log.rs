// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only step log records.
//!
//! Writing a log never affects execution; the records exist for dashboards
//! and debugging only.

use crate::id::{RunnerId, StepId, WorkflowId};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Who wrote the log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Framework,
    Handler,
}

crate::simple_display! {
    LogSource {
        Framework => "framework",
        Handler => "handler",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

crate::simple_display! {
    LogLevel {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Success => "success",
    }
}

/// One append-only observability record keyed by step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub id: String,
    pub step_id: StepId,
    pub workflow_id: WorkflowId,
    #[serde(default = "RunnerId::empty")]
    pub runner_id: RunnerId,
    #[serde(default)]
    pub facet_name: String,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub time: u64,
}

impl StepLogEntry {
    pub fn new(
        step_id: StepId,
        workflow_id: WorkflowId,
        source: LogSource,
        level: LogLevel,
        message: impl Into<String>,
        time: u64,
    ) -> Self {
        Self {
            id: format!("log-{}", nanoid::nanoid!(19)),
            step_id,
            workflow_id,
            runner_id: RunnerId::empty(),
            facet_name: String::new(),
            source,
            level,
            message: message.into(),
            details: None,
            time,
        }
    }
}
