// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-facet pause/resume and failure/retry, driven the way an external
//! agent would: claim atomically, reply through continue/fail, resume.

use crate::prelude::*;

fn claim_names() -> Vec<String> {
    vec!["docs.CountDocuments".to_string()]
}

#[test]
fn event_facet_pauses_then_agent_completes_it() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(true);
    let eng = engine(Arc::clone(&store) as Arc<dyn Store>);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();

    // Paused with exactly one pending task pointing at subStep1.
    assert_eq!(result.status, RunStatus::Paused);
    assert!(result.outputs.is_none() && result.error.is_none());
    let workflow_id = result.workflow_id;
    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");
    assert_eq!(sub.state, StepState::EventTransmit);
    let task = store.get_task_for_step(&sub.id).unwrap().unwrap();
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.data["input"], Value::from("some.file"));

    // Exactly one claim succeeds.
    let mut claimed = store.claim_task(&claim_names(), "default", 1).unwrap().unwrap();
    assert!(store.claim_task(&claim_names(), "default", 2).unwrap().is_none());
    assert_eq!(claimed.step_id, sub.id);

    // Agent computes, continues the step, settles the task, resumes.
    let mut reply = AttrMap::new();
    reply.insert("output".to_string(), Value::Int(5));
    eng.continue_step(sub.id, Some(reply)).unwrap();
    claimed.state = TaskState::Completed;
    store.save_task(&claimed).unwrap();

    let done = eng.resume(workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    // sum = (5 + 10) + 2.
    assert_eq!(done.outputs.unwrap()["sum"], Value::Int(17));
}

#[test]
fn duplicate_continue_is_not_observed() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(true);
    let eng = engine(Arc::clone(&store) as Arc<dyn Store>);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
    let sub = step_by_statement(store.as_ref(), &result.workflow_id, "subStep1");

    let mut reply = AttrMap::new();
    reply.insert("output".to_string(), Value::Int(5));
    assert!(eng.continue_step(sub.id, Some(reply)).unwrap());

    let mut stale = AttrMap::new();
    stale.insert("output".to_string(), Value::Int(500));
    assert!(!eng.continue_step(sub.id, Some(stale)).unwrap());

    let done = eng.resume(result.workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(done.outputs.unwrap()["sum"], Value::Int(17));
}

#[test]
fn agent_failure_errors_the_workflow_and_retry_recovers_it() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(true);
    let eng = engine(Arc::clone(&store) as Arc<dyn Store>);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
    let workflow_id = result.workflow_id;
    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");

    // Agent claims, fails the step, marks the task failed.
    let mut claimed = store.claim_task(&claim_names(), "default", 1).unwrap().unwrap();
    eng.fail_step(sub.id, "boom").unwrap();
    claimed.state = TaskState::Failed;
    claimed.error = Some("boom".to_string());
    store.save_task(&claimed).unwrap();

    let failed = eng.resume(workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(failed.status, RunStatus::Error);
    let error = failed.error.unwrap();
    assert!(error.message.contains("boom"));
    assert_eq!(error.step_id, Some(sub.id));

    // Every ancestor is terminal, root included.
    let root = steps_of_kind(store.as_ref(), &workflow_id, StepKind::Workflow)
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(root.state, StepState::StatementError);
    assert_eq!(
        store.get_flow_by_workflow(&workflow_id).unwrap().unwrap().status,
        FlowStatus::Error
    );

    // Operator retry requeues the task; a healthy agent cycle completes.
    eng.retry_step(sub.id).unwrap();
    let mut reclaimed = store.claim_task(&claim_names(), "default", 3).unwrap().unwrap();
    let mut reply = AttrMap::new();
    reply.insert("output".to_string(), Value::Int(5));
    eng.continue_step(sub.id, Some(reply)).unwrap();
    reclaimed.state = TaskState::Completed;
    reclaimed.error = None;
    store.save_task(&reclaimed).unwrap();

    let done = eng.resume(workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.outputs.unwrap()["sum"], Value::Int(17));
}

#[test]
fn at_most_one_running_task_per_step_under_concurrent_claims() {
    let store = Arc::new(MemoryStore::new());
    let (workflow, program) = nested_adder(true);
    let eng = engine(Arc::clone(&store) as Arc<dyn Store>);
    eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.claim_task(&claim_names(), "default", 1).unwrap()
        }));
    }
    let wins = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();
    assert_eq!(wins, 1);
}
