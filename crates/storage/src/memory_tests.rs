// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::ChangeSet;
use af_core::{StepDefinition, TaskDefinition};
use std::sync::Arc;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn reads_return_independent_copies() {
    let store = MemoryStore::new();
    let step = StepDefinition::builder().facet_name("ns.Value").build();
    store.save_step(&step).unwrap();

    let mut copy = store.get_step(&step.id).unwrap().unwrap();
    copy.facet_name = "mutated".to_string();

    let fresh = store.get_step(&step.id).unwrap().unwrap();
    assert_eq!(fresh.facet_name, "ns.Value");
}

#[test]
fn claim_task_transitions_to_running() {
    let store = MemoryStore::new();
    let task = TaskDefinition::builder().name("docs.Count").build();
    store.save_task(&task).unwrap();

    let claimed = store.claim_task(&names(&["docs.Count"]), "default", 500).unwrap().unwrap();
    assert_eq!(claimed.id, task.id);
    assert_eq!(claimed.state, TaskState::Running);
    assert_eq!(claimed.updated, 500);

    // Second claim finds nothing.
    assert!(store.claim_task(&names(&["docs.Count"]), "default", 501).unwrap().is_none());
}

#[test]
fn claim_respects_name_and_list_filters() {
    let store = MemoryStore::new();
    store.save_task(&TaskDefinition::builder().name("a.X").task_list_name("gpu").build()).unwrap();

    assert!(store.claim_task(&names(&["b.Y"]), "gpu", 0).unwrap().is_none());
    assert!(store.claim_task(&names(&["a.X"]), "default", 0).unwrap().is_none());
    assert!(store.claim_task(&names(&["a.X"]), "gpu", 0).unwrap().is_some());
}

#[test]
fn claim_is_exclusive_across_threads() {
    let store = Arc::new(MemoryStore::new());
    let task = TaskDefinition::builder().name("docs.Count").build();
    store.save_task(&task).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.claim_task(&names(&["docs.Count"]), "default", 1).unwrap()
        }));
    }

    let claimed = handles
        .into_iter()
        .map(|handle| handle.join())
        .filter(|result| matches!(result, Ok(Some(_))))
        .count();
    assert_eq!(claimed, 1);
}

#[test]
fn at_most_one_running_task_per_step() {
    let store = MemoryStore::new();
    let step_id = af_core::StepId::generate();
    let running = TaskDefinition::builder().step_id(step_id).state(TaskState::Running).build();
    store.save_task(&running).unwrap();

    let second = TaskDefinition::builder().step_id(step_id).state(TaskState::Running).build();
    let err = store.save_task(&second).unwrap_err();
    assert!(matches!(err, StoreError::RunningTaskConflict { .. }));

    // A pending task for the same step saves fine but cannot be claimed
    // while the first is running.
    let pending =
        TaskDefinition::builder().step_id(step_id).name("docs.Count").build();
    store.save_task(&pending).unwrap();
    assert!(store.claim_task(&names(&["docs.Count"]), "default", 0).unwrap().is_none());
}

#[test]
fn get_task_for_step_returns_most_recent() {
    let store = MemoryStore::new();
    let step_id = af_core::StepId::generate();
    let first = TaskDefinition::builder().step_id(step_id).created(1).build();
    let second = TaskDefinition::builder().step_id(step_id).created(2).build();
    store.save_task(&first).unwrap();
    store.save_task(&second).unwrap();

    let latest = store.get_task_for_step(&step_id).unwrap().unwrap();
    assert_eq!(latest.id, second.id);
}

#[test]
fn commit_is_all_or_nothing_on_injected_failure() {
    let store = MemoryStore::new();
    let mut changes = ChangeSet::new();
    changes.push_step(StepDefinition::builder().build());
    changes.push_task(TaskDefinition::builder().build());

    store.fail_next_commit();
    assert!(store.commit(&changes).is_err());
    assert!(store.get_step(&changes.steps[0].id).unwrap().is_none());
    assert!(store.get_task(&changes.tasks[0].id).unwrap().is_none());

    // Retry succeeds and applies everything.
    store.commit(&changes).unwrap();
    assert!(store.get_step(&changes.steps[0].id).unwrap().is_some());
    assert!(store.get_task(&changes.tasks[0].id).unwrap().is_some());
}

#[test]
fn commit_rolls_back_on_validation_conflict() {
    let store = MemoryStore::new();
    let step_id = af_core::StepId::generate();
    store
        .save_task(&TaskDefinition::builder().step_id(step_id).state(TaskState::Running).build())
        .unwrap();

    let mut changes = ChangeSet::new();
    changes.push_step(StepDefinition::builder().build());
    changes.push_task(TaskDefinition::builder().step_id(step_id).state(TaskState::Running).build());

    assert!(store.commit(&changes).is_err());
    // The step in the same change set must not have been applied.
    assert!(store.get_step(&changes.steps[0].id).unwrap().is_none());
}

#[test]
fn commit_is_idempotent() {
    let store = MemoryStore::new();
    let mut changes = ChangeSet::new();
    changes.push_step(StepDefinition::builder().build());
    let entry = af_core::StepLogEntry::new(
        af_core::StepId::generate(),
        af_core::WorkflowId::generate(),
        af_core::LogSource::Framework,
        af_core::LogLevel::Info,
        "created",
        7,
    );
    changes.push_log(entry.clone());

    store.commit(&changes).unwrap();
    store.commit(&changes).unwrap();

    assert_eq!(store.get_step_logs_by_step(&entry.step_id).unwrap().len(), 1);
}

#[test]
fn locks_expire_and_are_reclaimable() {
    let store = MemoryStore::new();
    assert!(store.acquire_lock("task:1", 100, None, 1_000).unwrap());
    // Held: second acquire fails.
    assert!(!store.acquire_lock("task:1", 100, None, 1_050).unwrap());
    // Extend pushes expiry out.
    assert!(store.extend_lock("task:1", 100, 1_050).unwrap());
    assert!(!store.acquire_lock("task:1", 100, None, 1_149).unwrap());
    // Past expiry: reclaimable.
    assert!(store.acquire_lock("task:1", 100, None, 1_150).unwrap());
}

#[test]
fn extend_fails_on_expired_or_missing_lock() {
    let store = MemoryStore::new();
    assert!(!store.extend_lock("missing", 100, 0).unwrap());
    store.acquire_lock("k", 10, None, 0).unwrap();
    assert!(!store.extend_lock("k", 100, 50).unwrap());
}

#[test]
fn release_lock_removes_it() {
    let store = MemoryStore::new();
    store.acquire_lock("k", 1_000, None, 0).unwrap();
    assert!(store.release_lock("k").unwrap());
    assert!(!store.release_lock("k").unwrap());
    assert!(store.get_lock("k").unwrap().is_none());
}

#[test]
fn registration_crud() {
    let store = MemoryStore::new();
    let reg = af_core::HandlerRegistration::builder().build();
    store.save_handler_registration(&reg).unwrap();

    assert_eq!(
        store.get_handler_registration(&reg.facet_name).unwrap().as_ref(),
        Some(&reg)
    );
    assert_eq!(store.list_handler_registrations().unwrap().len(), 1);
    assert!(store.delete_handler_registration(&reg.facet_name).unwrap());
    assert!(store.get_handler_registration(&reg.facet_name).unwrap().is_none());
}

#[test]
fn server_heartbeat_updates_ping() {
    let store = MemoryStore::new();
    let server = af_core::ServerDefinition::builder().build();
    store.save_server(&server).unwrap();

    assert!(store.heartbeat_server(&server.id, 9_000).unwrap());
    assert_eq!(store.get_server(&server.id).unwrap().unwrap().ping_time, 9_000);
    assert!(!store.heartbeat_server(&af_core::ServerId::generate(), 1).unwrap());
}
