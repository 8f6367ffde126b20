// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner processes servicing the task queue end to end.

use crate::prelude::*;
use af_engine::DispatchError;
use af_runner::{AgentPoller, RegistryRunner, RunnerConfig};
use std::time::Duration;

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        poll_interval_ms: 10,
        heartbeat_interval_ms: 10,
        registry_refresh_interval_ms: 20,
        handler_timeout_ms: 1_000,
        shutdown_timeout_ms: 1_000,
        ..Default::default()
    }
}

async fn wait_for(mut probe: impl FnMut() -> bool) {
    for _ in 0..300 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(false, "condition not reached within 3s");
}

#[tokio::test]
async fn agent_poller_services_the_paused_workflow() {
    let store = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    let eng = Arc::new(
        Engine::new(Arc::clone(&store) as Arc<dyn Store>).with_clock(clock.clone()),
    );
    let (workflow, program) = nested_adder(true);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
    assert_eq!(result.status, RunStatus::Paused);
    let workflow_id = result.workflow_id;

    let poller = Arc::new(AgentPoller::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&eng),
        fast_config(),
        clock,
    ));
    poller.register("docs.CountDocuments", |payload: &AttrMap| {
        assert_eq!(payload["input"], Value::from("some.file"));
        let mut out = AttrMap::new();
        out.insert("output".to_string(), Value::Int(5));
        Ok(out)
    });

    let handle = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move { poller.run().await })
    };

    let probe_store = Arc::clone(&store);
    wait_for(move || {
        probe_store
            .get_flow_by_workflow(&workflow_id)
            .unwrap()
            .is_some_and(|f| f.status == FlowStatus::Completed)
    })
    .await;
    poller.stop();
    handle.await.unwrap().unwrap();

    let flow = store.get_flow_by_workflow(&workflow_id).unwrap().unwrap();
    let root = store.get_step(&flow.root_step_id).unwrap().unwrap();
    assert_eq!(root.attributes.returns["sum"], Value::Int(17));
}

#[tokio::test]
async fn failed_agent_cycle_is_retryable_through_the_same_queue() {
    let store = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    let eng = Arc::new(
        Engine::new(Arc::clone(&store) as Arc<dyn Store>).with_clock(clock.clone()),
    );
    let (workflow, program) = nested_adder(true);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
    let workflow_id = result.workflow_id;
    let sub = step_by_statement(store.as_ref(), &workflow_id, "subStep1");

    // First runner always fails.
    let failing = Arc::new(AgentPoller::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&eng),
        fast_config(),
        clock.clone(),
    ));
    failing.register("docs.CountDocuments", |_: &AttrMap| {
        Err(DispatchError::handler("disk on fire"))
    });
    let handle = {
        let failing = Arc::clone(&failing);
        tokio::spawn(async move { failing.run().await })
    };
    let probe_store = Arc::clone(&store);
    wait_for(move || {
        probe_store
            .get_flow_by_workflow(&workflow_id)
            .unwrap()
            .is_some_and(|f| f.status == FlowStatus::Error)
    })
    .await;
    failing.stop();
    handle.await.unwrap().unwrap();

    let task = store.get_task_for_step(&sub.id).unwrap().unwrap();
    assert_eq!(task.state, TaskState::Failed);

    // Retry requeues; a healthy runner finishes the job.
    eng.retry_step(sub.id).unwrap();
    let healthy = Arc::new(AgentPoller::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&eng),
        fast_config(),
        clock,
    ));
    healthy.register("docs.CountDocuments", |_: &AttrMap| {
        let mut out = AttrMap::new();
        out.insert("output".to_string(), Value::Int(5));
        Ok(out)
    });
    let handle = {
        let healthy = Arc::clone(&healthy);
        tokio::spawn(async move { healthy.run().await })
    };
    let probe_store = Arc::clone(&store);
    wait_for(move || {
        probe_store
            .get_flow_by_workflow(&workflow_id)
            .unwrap()
            .is_some_and(|f| f.status == FlowStatus::Completed)
    })
    .await;
    healthy.stop();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn registry_runner_resolves_handlers_from_persistence() {
    let store = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    let eng = Arc::new(
        Engine::new(Arc::clone(&store) as Arc<dyn Store>).with_clock(clock.clone()),
    );
    let (workflow, program) = nested_adder(true);
    let result = eng.execute(workflow, program, AttrMap::new(), ExecOptions::default()).unwrap();
    let workflow_id = result.workflow_id;

    store
        .save_handler_registration(&af_core::HandlerRegistration {
            facet_name: "docs.CountDocuments".to_string(),
            module_uri: "mod://handlers/docs".to_string(),
            entrypoint: "count".to_string(),
            version: "1.0.0".to_string(),
            checksum: "c0ffee".to_string(),
            timeout_ms: None,
            requirements: Vec::new(),
            metadata: AttrMap::new(),
        })
        .unwrap();

    let runner = RegistryRunner::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&eng),
        fast_config(),
        clock,
        vec!["docs.*".to_string()],
    )
    .unwrap();
    runner.register_module(
        "mod://handlers/docs",
        Arc::new(af_engine::MapModule::new().with("count", |_: &AttrMap| {
            let mut out = AttrMap::new();
            out.insert("output".to_string(), Value::Int(5));
            Ok(out)
        })),
    );
    let runner = Arc::new(runner);
    let handle = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run().await })
    };

    let probe_store = Arc::clone(&store);
    wait_for(move || {
        probe_store
            .get_flow_by_workflow(&workflow_id)
            .unwrap()
            .is_some_and(|f| f.status == FlowStatus::Completed)
    })
    .await;
    runner.stop();
    handle.await.unwrap().unwrap();

    let flow = store.get_flow_by_workflow(&workflow_id).unwrap().unwrap();
    let root = store.get_step(&flow.root_step_id).unwrap().unwrap();
    assert_eq!(root.attributes.returns["sum"], Value::Int(17));
}
