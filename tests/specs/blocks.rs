// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-block bodies and nested statement-inline bodies.

use crate::prelude::*;

/// Three sibling blocks, each yielding a distinct output field.
fn three_block_workflow() -> (WorkflowAst, ProgramAst) {
    let block = |n: i64, field: &str| BlockAst {
        kind: Default::default(),
        statements: vec![
            AssignmentStatement::call("s", "ns.Value", [("input", Expr::int(n))]),
            YieldStatement::to("Triple", [(
                match field {
                    "first" => "first",
                    "second" => "second",
                    _ => "third",
                },
                Expr::step_attr("s", "input"),
            )]),
        ],
    };

    let workflow = WorkflowAst {
        name: "Triple".to_string(),
        params: vec![],
        body: vec![block(1, "first"), block(2, "second"), block(3, "third")],
    };
    let program = ProgramAst { facets: vec![value_facet()], ..Default::default() };
    (workflow, program)
}

#[test]
fn three_sibling_blocks_merge_three_outputs() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = three_block_workflow();
    let result = engine(Arc::clone(&store) as Arc<dyn Store>)
        .execute(workflow, program, AttrMap::new(), ExecOptions::default())
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    let outputs = result.outputs.unwrap();
    assert_eq!(outputs["first"], Value::Int(1));
    assert_eq!(outputs["second"], Value::Int(2));
    assert_eq!(outputs["third"], Value::Int(3));

    let workflow_id = result.workflow_id;
    let blocks = steps_of_kind(store.as_ref(), &workflow_id, StepKind::AndThen);
    assert_eq!(blocks.len(), 3);
    let ids: Vec<&str> = blocks.iter().map(|b| b.statement_id.as_str()).collect();
    assert_eq!(ids, ["block-0", "block-1", "block-2"]);
    assert_eq!(steps_of_kind(store.as_ref(), &workflow_id, StepKind::YieldAssignment).len(), 3);
}

#[test]
fn nested_inline_body_computes_sum_13() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(false);
    let result = engine(Arc::clone(&store) as Arc<dyn Store>)
        .execute(workflow, program, AttrMap::new(), ExecOptions::default())
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.outputs.unwrap()["sum"], Value::Int(13));

    // Census: root, the body block, s1, s1's inline block, subStep1, the
    // inner yield, s2, the outer yield. One flow record accompanies the
    // step tree; no tasks and no logs, so those are all the persisted
    // records this scenario produces.
    let workflow_id = result.workflow_id;
    let steps = store.get_steps_by_workflow(&workflow_id).unwrap();
    assert_eq!(steps.len(), 8);
    assert_eq!(steps_of_kind(store.as_ref(), &workflow_id, StepKind::VariableAssignment).len(), 3);
    assert_eq!(steps_of_kind(store.as_ref(), &workflow_id, StepKind::YieldAssignment).len(), 2);
    assert_eq!(steps_of_kind(store.as_ref(), &workflow_id, StepKind::AndThen).len(), 2);
    assert_eq!(steps_of_kind(store.as_ref(), &workflow_id, StepKind::Workflow).len(), 1);

    let flow = store.get_flow_by_workflow(&workflow_id).unwrap().unwrap();
    assert_eq!(flow.counters.steps_created, 8);
    assert_eq!(flow.counters.steps_completed, 8);
    assert_eq!(flow.counters.tasks_created, 0);
    assert!(store.get_step_logs_by_workflow(&workflow_id).unwrap().is_empty());
}

#[test]
fn inner_scope_reads_the_containing_steps_params() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(false);
    let mut inputs = AttrMap::new();
    inputs.insert("a".to_string(), Value::Int(7));
    let result = engine(Arc::clone(&store) as Arc<dyn Store>)
        .execute(workflow, program, inputs, ExecOptions::default())
        .unwrap();

    // subStep1's `$.input` resolved against s1's params (input = a = 7),
    // so sum = (7 + 10) + 2.
    assert_eq!(result.outputs.unwrap()["sum"], Value::Int(19));
}

#[test]
fn hierarchy_links_form_a_tree() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(false);
    let result = engine(Arc::clone(&store) as Arc<dyn Store>)
        .execute(workflow, program, AttrMap::new(), ExecOptions::default())
        .unwrap();
    let workflow_id = result.workflow_id;

    let root = steps_of_kind(store.as_ref(), &workflow_id, StepKind::Workflow)
        .into_iter()
        .next()
        .unwrap();
    assert!(root.container_id.is_empty());
    assert_eq!(root.root_id, root.id);

    let s1 = step_by_statement(store.as_ref(), &workflow_id, "s1");
    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");
    let inner_block = store.get_step(&sub.block_id).unwrap().unwrap();

    // The inner block is owned by s1; everything shares the root.
    assert_eq!(inner_block.container_id, s1.id);
    for step in store.get_steps_by_workflow(&workflow_id).unwrap() {
        if step.id != root.id {
            assert_eq!(step.root_id, root.id);
            assert_eq!(step.workflow_id, workflow_id);
        }
    }
}
