// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    variable = { StepKind::VariableAssignment, false },
    and_then = { StepKind::AndThen, true },
    and_map = { StepKind::AndMap, true },
    and_match = { StepKind::AndMatch, true },
    yield_kind = { StepKind::YieldAssignment, false },
    workflow = { StepKind::Workflow, false },
)]
fn block_kinds(kind: StepKind, expected: bool) {
    assert_eq!(kind.is_block(), expected);
}

#[test]
fn new_step_starts_created() {
    let step = StepDefinition::new(StepKind::VariableAssignment, WorkflowId::generate(), 100);
    assert_eq!(step.state, StepState::Created);
    assert!(!step.is_terminal());
    assert_eq!(step.created, 100);
    assert_eq!(step.transition, Transition::default());
}

#[test]
fn full_step_walks_its_table() {
    let mut step = StepDefinition::new(StepKind::VariableAssignment, WorkflowId::generate(), 0);
    let mut count = 0;
    while let Some(next) = step.next_state() {
        step.state = next;
        count += 1;
    }
    assert_eq!(step.state, StepState::StatementComplete);
    // 18-state table, 17 transitions.
    assert_eq!(count, 17);
}

#[test]
fn yield_step_skips_block_states() {
    let step = StepDefinition::builder().kind(StepKind::YieldAssignment).build();
    let table = step.kind.state_table();
    assert!(!table.contains(&StepState::StatementBlocksBegin));
    assert!(!table.contains(&StepState::EventTransmit));
}

#[test]
fn fail_is_terminal_and_carries_message() {
    let mut step = StepDefinition::builder().build();
    step.fail("division by zero in s1.input");

    assert_eq!(step.state, StepState::StatementError);
    assert!(step.is_terminal());
    assert!(step.next_state().is_none());
    let err = step.transition.error.unwrap();
    assert_eq!(err.message, "division by zero in s1.input");
}

#[test]
fn request_advance_marks_changed() {
    let mut step = StepDefinition::builder().build();
    step.request_advance();
    assert!(step.transition.request_transition);
    assert!(step.transition.changed);
}

#[test]
fn push_me_clears_advance() {
    let mut step = StepDefinition::builder().build();
    step.request_advance();
    step.push_me();
    assert!(!step.transition.request_transition);
    assert!(step.transition.push_me);
}

#[test]
fn serde_round_trip() {
    let step = StepDefinition::builder()
        .facet_name("ns.Value")
        .statement_id("s1")
        .state(StepState::EventTransmit)
        .build();

    let json = serde_json::to_string(&step).unwrap();
    let back: StepDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back, step);
}
