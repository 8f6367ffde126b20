// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart recovery: a paused workflow survives a full process restart on
//! the journaled store, and a fresh engine reconstructs execution entirely
//! from persistence.

use crate::prelude::*;
use af_storage::JournalStore;
use tempfile::tempdir;

#[test]
fn paused_workflow_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let (workflow, program) = nested_adder(true);

    // Process one: execute until the event facet pauses the run.
    let workflow_id = {
        let store: Arc<dyn Store> = Arc::new(JournalStore::open(dir.path()).unwrap());
        let eng = engine(Arc::clone(&store));
        let result =
            eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
        assert_eq!(result.status, RunStatus::Paused);
        result.workflow_id
    };

    // Process two: reopen the journal, rediscover the task, finish the
    // agent cycle. The AST comes from the replayed flow record.
    let store: Arc<dyn Store> = Arc::new(JournalStore::open(dir.path()).unwrap());
    let eng = engine(Arc::clone(&store));

    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");
    assert_eq!(sub.state, StepState::EventTransmit);
    let mut task = store
        .claim_task(&vec!["docs.CountDocuments".to_string()], "default", 1)
        .unwrap()
        .unwrap();
    assert_eq!(task.step_id, sub.id);

    let mut reply = AttrMap::new();
    reply.insert("output".to_string(), Value::Int(5));
    eng.continue_step(sub.id, Some(reply)).unwrap();
    task.state = TaskState::Completed;
    store.save_task(&task).unwrap();

    let done = eng.resume(workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(done.status, RunStatus::Completed);
    assert_eq!(done.outputs.unwrap()["sum"], Value::Int(17));
}

#[test]
fn compacted_store_still_resumes() {
    let dir = tempdir().unwrap();
    let (workflow, program) = nested_adder(true);

    let workflow_id = {
        let journal = Arc::new(JournalStore::open(dir.path()).unwrap());
        let store: Arc<dyn Store> = Arc::clone(&journal) as Arc<dyn Store>;
        let eng = engine(store);
        let result =
            eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
        journal.compact().unwrap();
        result.workflow_id
    };

    let store: Arc<dyn Store> = Arc::new(JournalStore::open(dir.path()).unwrap());
    let eng = engine(Arc::clone(&store));
    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");

    let mut reply = AttrMap::new();
    reply.insert("output".to_string(), Value::Int(5));
    eng.continue_step(sub.id, Some(reply)).unwrap();
    let done = eng.resume(workflow_id, ExecOptions::default()).unwrap();
    assert_eq!(done.status, RunStatus::Completed);
}

#[test]
fn replayed_claims_stay_claimed_across_restart() {
    let dir = tempdir().unwrap();
    let (workflow, program) = nested_adder(true);
    let names = vec!["docs.CountDocuments".to_string()];

    {
        let store: Arc<dyn Store> = Arc::new(JournalStore::open(dir.path()).unwrap());
        let eng = engine(Arc::clone(&store));
        eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
        assert!(store.claim_task(&names, "default", 1).unwrap().is_some());
    }

    // The running claim was journaled; a restarted runner cannot claim the
    // same task again.
    let store: Arc<dyn Store> = Arc::new(JournalStore::open(dir.path()).unwrap());
    assert!(store.claim_task(&names, "default", 2).unwrap().is_none());
}
