// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step records and the transition control record.

use crate::ast::BlockAst;
use crate::attrs::FacetAttributes;
use crate::id::{StepId, WorkflowId};
use crate::state::{
    StepState, BLOCK_STATES, FULL_STEP_STATES, SCHEMA_STATES, YIELD_STATES,
};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// What kind of AST construct a step instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    VariableAssignment,
    YieldAssignment,
    SchemaInstantiation,
    AndThen,
    AndMap,
    AndMatch,
    Workflow,
}

crate::simple_display! {
    StepKind {
        VariableAssignment => "VariableAssignment",
        YieldAssignment => "YieldAssignment",
        SchemaInstantiation => "SchemaInstantiation",
        AndThen => "AndThen",
        AndMap => "AndMap",
        AndMatch => "AndMatch",
        Workflow => "Workflow",
    }
}

impl StepKind {
    /// Block steps own the child steps produced by their block body.
    pub fn is_block(&self) -> bool {
        matches!(self, StepKind::AndThen | StepKind::AndMap | StepKind::AndMatch)
    }

    /// The ordered state table this kind progresses through.
    pub fn state_table(&self) -> &'static [StepState] {
        match self {
            StepKind::VariableAssignment | StepKind::Workflow => FULL_STEP_STATES,
            StepKind::AndThen | StepKind::AndMap | StepKind::AndMatch => BLOCK_STATES,
            StepKind::YieldAssignment => YIELD_STATES,
            StepKind::SchemaInstantiation => SCHEMA_STATES,
        }
    }
}

/// Terminal failure payload on a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// State-machine control intent, carried on the step between handler calls.
///
/// `request_transition` asks the orchestrator to advance to the next table
/// state; `push_me` re-queues the step for the next iteration (only the
/// `*.Continue` polling states use it); `changed` tells persistence whether
/// anything was mutated; `error` is a terminal failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub request_transition: bool,
    #[serde(default)]
    pub push_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransitionError>,
}

impl Transition {
    pub fn reset(&mut self) {
        *self = Transition::default();
    }
}

/// One runtime step instance.
///
/// Hierarchy links form a tree: `container_id` is the step that owns this
/// block or step, `block_id` the immediate containing block, `root_id` the
/// workflow root. All are empty on the root step itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub kind: StepKind,
    /// Qualified name of the called facet; empty for blocks.
    #[serde(default)]
    pub facet_name: String,
    /// AST statement that spawned this step; `"block-N"` selects the N-th
    /// body block for multi-block containers.
    #[serde(default)]
    pub statement_id: String,
    pub workflow_id: WorkflowId,
    #[serde(default = "StepId::empty")]
    pub container_id: StepId,
    #[serde(default = "StepId::empty")]
    pub block_id: StepId,
    #[serde(default = "StepId::empty")]
    pub root_id: StepId,
    pub state: StepState,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub attributes: FacetAttributes,
    /// Loop binding, non-empty only for per-iteration foreach sub-blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach_value: Option<Value>,
    /// Cached body AST for foreach sub-blocks, resolved once at fan-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach_body: Option<BlockAst>,
    /// Epoch ms when the step was first persisted.
    #[serde(default)]
    pub created: u64,
    /// Epoch ms of the last persisted write.
    #[serde(default)]
    pub updated: u64,
}

impl StepDefinition {
    /// Create a fresh step at `Created`.
    pub fn new(kind: StepKind, workflow_id: WorkflowId, epoch_ms: u64) -> Self {
        let id = StepId::generate();
        Self {
            id,
            kind,
            facet_name: String::new(),
            statement_id: String::new(),
            workflow_id,
            container_id: StepId::empty(),
            block_id: StepId::empty(),
            root_id: StepId::empty(),
            state: StepState::Created,
            transition: Transition::default(),
            attributes: FacetAttributes::default(),
            foreach_var: None,
            foreach_value: None,
            foreach_body: None,
            created: epoch_ms,
            updated: epoch_ms,
        }
    }

    /// Terminal steps never transition further.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    /// The next state in this step's table, if any.
    pub fn next_state(&self) -> Option<StepState> {
        self.state.next_in(self.kind.state_table())
    }

    /// Handler intent: advance to the next table state on the next tick.
    pub fn request_advance(&mut self) {
        self.transition.request_transition = true;
        self.transition.changed = true;
    }

    /// Handler intent: stay in this state and re-queue for the next
    /// iteration.
    pub fn push_me(&mut self) {
        self.transition.request_transition = false;
        self.transition.push_me = true;
    }

    /// Handler intent: park in this state without re-queueing (the step
    /// resumes only through an external `continue_step`/`fail_step`).
    pub fn park(&mut self) {
        self.transition.request_transition = false;
        self.transition.push_me = false;
    }

    /// Fail terminally with a message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.fail_with_details(message, None);
    }

    /// Fail terminally with a message and structured details.
    pub fn fail_with_details(&mut self, message: impl Into<String>, details: Option<Value>) {
        self.transition.request_transition = false;
        self.transition.push_me = false;
        self.transition.changed = true;
        self.transition.error = Some(TransitionError { message: message.into(), details });
        self.state = StepState::StatementError;
    }
}

crate::builder! {
    pub struct StepBuilder => StepDefinition {
        into {
            facet_name: String = "",
            statement_id: String = "s1",
        }
        set {
            id: StepId = StepId::generate(),
            kind: StepKind = StepKind::VariableAssignment,
            workflow_id: WorkflowId = WorkflowId::generate(),
            container_id: StepId = StepId::empty(),
            block_id: StepId = StepId::empty(),
            root_id: StepId = StepId::empty(),
            state: StepState = StepState::Created,
            transition: Transition = Transition::default(),
            attributes: FacetAttributes = FacetAttributes::default(),
            created: u64 = 0,
            updated: u64 = 0,
        }
        option {
            foreach_var: String = None,
            foreach_value: Value = None,
            foreach_body: BlockAst = None,
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
