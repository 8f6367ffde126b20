// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step state constants and the per-kind state tables.
//!
//! Each step kind progresses through a strictly ordered list of states; all
//! transitions are single-step forward. The tables are the only place the
//! ordering is defined — handlers look up "next" here and never hardcode it.

use serde::{Deserialize, Serialize};

/// Every state a step can occupy, across all four tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepState {
    #[serde(rename = "Created")]
    Created,
    #[serde(rename = "facet.init.Begin")]
    FacetInitBegin,
    #[serde(rename = "facet.init.End")]
    FacetInitEnd,
    #[serde(rename = "facet.scripts.Begin")]
    FacetScriptsBegin,
    #[serde(rename = "facet.scripts.End")]
    FacetScriptsEnd,
    #[serde(rename = "mixin.blocks.Begin")]
    MixinBlocksBegin,
    #[serde(rename = "mixin.blocks.Continue")]
    MixinBlocksContinue,
    #[serde(rename = "mixin.blocks.End")]
    MixinBlocksEnd,
    #[serde(rename = "mixin.capture.Begin")]
    MixinCaptureBegin,
    #[serde(rename = "mixin.capture.End")]
    MixinCaptureEnd,
    #[serde(rename = "EventTransmit")]
    EventTransmit,
    #[serde(rename = "statement.blocks.Begin")]
    StatementBlocksBegin,
    #[serde(rename = "statement.blocks.Continue")]
    StatementBlocksContinue,
    #[serde(rename = "statement.blocks.End")]
    StatementBlocksEnd,
    #[serde(rename = "statement.capture.Begin")]
    StatementCaptureBegin,
    #[serde(rename = "statement.capture.End")]
    StatementCaptureEnd,
    #[serde(rename = "block.execution.Begin")]
    BlockExecutionBegin,
    #[serde(rename = "block.execution.Continue")]
    BlockExecutionContinue,
    #[serde(rename = "block.execution.End")]
    BlockExecutionEnd,
    #[serde(rename = "statement.End")]
    StatementEnd,
    #[serde(rename = "statement.Complete")]
    StatementComplete,
    #[serde(rename = "statement.Error")]
    StatementError,
}

crate::simple_display! {
    StepState {
        Created => "Created",
        FacetInitBegin => "facet.init.Begin",
        FacetInitEnd => "facet.init.End",
        FacetScriptsBegin => "facet.scripts.Begin",
        FacetScriptsEnd => "facet.scripts.End",
        MixinBlocksBegin => "mixin.blocks.Begin",
        MixinBlocksContinue => "mixin.blocks.Continue",
        MixinBlocksEnd => "mixin.blocks.End",
        MixinCaptureBegin => "mixin.capture.Begin",
        MixinCaptureEnd => "mixin.capture.End",
        EventTransmit => "EventTransmit",
        StatementBlocksBegin => "statement.blocks.Begin",
        StatementBlocksContinue => "statement.blocks.Continue",
        StatementBlocksEnd => "statement.blocks.End",
        StatementCaptureBegin => "statement.capture.Begin",
        StatementCaptureEnd => "statement.capture.End",
        BlockExecutionBegin => "block.execution.Begin",
        BlockExecutionContinue => "block.execution.Continue",
        BlockExecutionEnd => "block.execution.End",
        StatementEnd => "statement.End",
        StatementComplete => "statement.Complete",
        StatementError => "statement.Error",
    }
}

/// Table for full steps (`VariableAssignment` and workflow roots).
pub const FULL_STEP_STATES: &[StepState] = &[
    StepState::Created,
    StepState::FacetInitBegin,
    StepState::FacetInitEnd,
    StepState::FacetScriptsBegin,
    StepState::FacetScriptsEnd,
    StepState::MixinBlocksBegin,
    StepState::MixinBlocksContinue,
    StepState::MixinBlocksEnd,
    StepState::MixinCaptureBegin,
    StepState::MixinCaptureEnd,
    StepState::EventTransmit,
    StepState::StatementBlocksBegin,
    StepState::StatementBlocksContinue,
    StepState::StatementBlocksEnd,
    StepState::StatementCaptureBegin,
    StepState::StatementCaptureEnd,
    StepState::StatementEnd,
    StepState::StatementComplete,
];

/// Table for block steps (`AndThen`/`AndMap`/`AndMatch`).
pub const BLOCK_STATES: &[StepState] = &[
    StepState::Created,
    StepState::BlockExecutionBegin,
    StepState::BlockExecutionContinue,
    StepState::BlockExecutionEnd,
    StepState::StatementEnd,
    StepState::StatementComplete,
];

/// Table for yield steps.
pub const YIELD_STATES: &[StepState] = &[
    StepState::Created,
    StepState::FacetInitBegin,
    StepState::FacetInitEnd,
    StepState::FacetScriptsBegin,
    StepState::FacetScriptsEnd,
    StepState::StatementEnd,
    StepState::StatementComplete,
];

/// Table for schema instantiation steps.
pub const SCHEMA_STATES: &[StepState] = &[
    StepState::Created,
    StepState::FacetInitBegin,
    StepState::FacetInitEnd,
    StepState::StatementEnd,
    StepState::StatementComplete,
];

impl StepState {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::StatementComplete | StepState::StatementError)
    }

    /// The state after `self` in the given table, or `None` at the end or
    /// when `self` is not in the table (error states are in no table).
    pub fn next_in(&self, table: &[StepState]) -> Option<StepState> {
        let pos = table.iter().position(|s| s == self)?;
        table.get(pos + 1).copied()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
