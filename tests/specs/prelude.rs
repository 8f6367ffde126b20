// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario specs.

pub use af_core::{
    AssignmentStatement, AttrMap, BlockAst, Expr, FacetDecl, FakeClock, FlowStatus, ParamDecl,
    ProgramAst, Statement, StepDefinition, StepKind, StepState, TaskState, Value, WorkflowAst,
    WorkflowId, YieldStatement,
};
pub use af_engine::{Engine, ExecOptions, RunStatus};
pub use af_storage::{MemoryStore, Store};
pub use std::sync::Arc;

/// Engine over a fresh in-memory store, with a ticking fake clock so every
/// iteration commits under a distinct timestamp.
pub fn engine(store: Arc<dyn Store>) -> Engine<FakeClock> {
    let clock = FakeClock::new();
    clock.set_auto_tick(1);
    Engine::new(store).with_clock(clock)
}

pub fn value_facet() -> FacetDecl {
    FacetDecl {
        name: "ns.Value".to_string(),
        params: vec![ParamDecl { name: "input".to_string(), default: None }],
        ..Default::default()
    }
}

pub fn step_by_statement(
    store: &dyn Store,
    workflow_id: &WorkflowId,
    statement_id: &str,
) -> StepDefinition {
    store
        .get_steps_by_workflow(workflow_id)
        .unwrap()
        .into_iter()
        .find(|s| s.statement_id == statement_id)
        .unwrap_or_else(|| panic!("no step for statement '{}'", statement_id))
}

pub fn steps_of_kind(
    store: &dyn Store,
    workflow_id: &WorkflowId,
    kind: StepKind,
) -> Vec<StepDefinition> {
    store
        .get_steps_by_workflow(workflow_id)
        .unwrap()
        .into_iter()
        .filter(|s| s.kind == kind)
        .collect()
}

/// S1: `input default 1; s1 = Value($.input + 1); s2 = Value(s1.input + 1);
/// yield Chain(output = s2.input + 1)`.
pub fn linear_chain() -> (WorkflowAst, ProgramAst) {
    let workflow = WorkflowAst {
        name: "Chain".to_string(),
        params: vec![ParamDecl { name: "input".to_string(), default: Some(Value::Int(1)) }],
        body: vec![BlockAst {
            kind: Default::default(),
            statements: vec![
                AssignmentStatement::call("s1", "ns.Value", [(
                    "input",
                    Expr::add(Expr::input("input"), Expr::int(1)),
                )]),
                AssignmentStatement::call("s2", "ns.Value", [(
                    "input",
                    Expr::add(Expr::step_attr("s1", "input"), Expr::int(1)),
                )]),
                YieldStatement::to("Chain", [(
                    "output",
                    Expr::add(Expr::step_attr("s2", "input"), Expr::int(1)),
                )]),
            ],
        }],
    };
    let program = ProgramAst { facets: vec![value_facet()], ..Default::default() };
    (workflow, program)
}

/// S2: `a = Value($.input + 1); b = Value($.input + 10);
/// c = Value(a.input + b.input); yield FanIn(output = c.input)`.
pub fn parallel_fan_in() -> (WorkflowAst, ProgramAst) {
    let workflow = WorkflowAst {
        name: "FanIn".to_string(),
        params: vec![ParamDecl { name: "input".to_string(), default: Some(Value::Int(1)) }],
        body: vec![BlockAst {
            kind: Default::default(),
            statements: vec![
                AssignmentStatement::call("a", "ns.Value", [(
                    "input",
                    Expr::add(Expr::input("input"), Expr::int(1)),
                )]),
                AssignmentStatement::call("b", "ns.Value", [(
                    "input",
                    Expr::add(Expr::input("input"), Expr::int(10)),
                )]),
                AssignmentStatement::call("c", "ns.Value", [(
                    "input",
                    Expr::add(Expr::step_attr("a", "input"), Expr::step_attr("b", "input")),
                )]),
                YieldStatement::to("FanIn", [("output", Expr::step_attr("c", "input"))]),
            ],
        }],
    };
    let program = ProgramAst { facets: vec![value_facet()], ..Default::default() };
    (workflow, program)
}

/// S4/S5/S6 nested workflow. `event` selects whether the inner facet is an
/// event facet (S5/S6) or computes inline via a literal (S4).
///
/// ```text
/// Adder(a = 1, b = 2):
///   s1 = ns.SomeFacet(input = $.a) andThen {
///       subStep1 = <inner>(input = ...)
///       yield SomeFacet(output = subStep1.<attr> + 10)
///   }
///   s2 = ns.Value(input = $.b)
///   yield Adder(sum = s1.output + s2.input)
/// ```
pub fn nested_adder(event: bool) -> (WorkflowAst, ProgramAst) {
    let (inner_facet, inner_attr, inner_arg) = if event {
        ("docs.CountDocuments", "output", Expr::str("some.file"))
    } else {
        ("ns.Value", "input", Expr::input("input"))
    };

    let inline_body = BlockAst {
        kind: Default::default(),
        statements: vec![
            AssignmentStatement::call("subStep1", inner_facet, [("input", inner_arg)]),
            YieldStatement::to("SomeFacet", [(
                "output",
                Expr::add(Expr::step_attr("subStep1", inner_attr), Expr::int(10)),
            )]),
        ],
    };

    let mut s1 = AssignmentStatement {
        name: "s1".to_string(),
        facet: "ns.SomeFacet".to_string(),
        args: Default::default(),
        body: vec![inline_body],
        foreach: None,
    };
    s1.args.insert("input".to_string(), Expr::input("a"));

    let workflow = WorkflowAst {
        name: "Adder".to_string(),
        params: vec![
            ParamDecl { name: "a".to_string(), default: Some(Value::Int(1)) },
            ParamDecl { name: "b".to_string(), default: Some(Value::Int(2)) },
        ],
        body: vec![BlockAst {
            kind: Default::default(),
            statements: vec![
                Statement::Assignment(s1),
                AssignmentStatement::call("s2", "ns.Value", [("input", Expr::input("b"))]),
                YieldStatement::to("Adder", [(
                    "sum",
                    Expr::add(Expr::step_attr("s1", "output"), Expr::step_attr("s2", "input")),
                )]),
            ],
        }],
    };

    let mut facets = vec![
        value_facet(),
        FacetDecl {
            name: "ns.SomeFacet".to_string(),
            params: vec![ParamDecl { name: "input".to_string(), default: None }],
            ..Default::default()
        },
    ];
    if event {
        facets.push(FacetDecl {
            name: "docs.CountDocuments".to_string(),
            event: true,
            ..Default::default()
        });
    }
    let program = ProgramAst { facets, ..Default::default() };
    (workflow, program)
}
