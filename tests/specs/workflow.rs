// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end workflow scenarios over real store and broker files.

use std::sync::Arc;

use gantry_core::{CaseStatus, GpuStatus};
use gantry_daemon::workers::remote_executor::RemoteExecutor;
use gantry_remote::FakeShell;
use serde_json::json;

use crate::support::{drain_plain, drain_queue_with_worker, fast_retry, harness, EXECUTOR};

#[tokio::test]
async fn happy_path_single_case_two_steps() {
    let h = harness(&["stepA", "stepB"]);
    h.store.register_gpu(0, None).unwrap();

    // Scanner announces the case.
    h.publish_event("new_case_found", json!({"case_id": "c1"})).await;
    h.pump_conductor().await;

    let case = h.store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Processing);
    assert_eq!(case.workflow_step.as_deref(), Some("stepA"));
    assert_eq!(case.assigned_gpu_id, Some(0));

    // Remote executor runs stepA and reports back.
    let shell = FakeShell::new();
    shell.push_success("stepA done");
    let mut executor = RemoteExecutor::new(Arc::new(shell.clone()), EXECUTOR.into());
    drain_queue_with_worker(&h.broker, &mut executor, fast_retry()).await;
    h.pump_conductor().await;

    let case = h.store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Processing);
    assert_eq!(case.workflow_step.as_deref(), Some("stepB"));
    assert_eq!(case.assigned_gpu_id, Some(0), "GPU is held across steps");

    // stepB completes the workflow.
    shell.push_success("stepB done");
    drain_queue_with_worker(&h.broker, &mut executor, fast_retry()).await;
    h.pump_conductor().await;

    let case = h.store.get_case("c1").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Completed);
    assert_eq!(case.workflow_step, None);
    assert_eq!(case.assigned_gpu_id, None);
    assert_eq!(h.store.list_gpus().unwrap()[0].status, GpuStatus::Available);

    // The executor saw the fully substituted commands.
    assert_eq!(
        shell.commands(),
        vec!["stepA --case c1 --gpu 0", "stepB --case c1 --gpu 0"]
    );

    let statuses: Vec<_> =
        h.store.case_history("c1").unwrap().into_iter().map(|row| row.status).collect();
    assert_eq!(
        statuses,
        vec![
            CaseStatus::Queued,
            CaseStatus::Processing,
            CaseStatus::Processing,
            CaseStatus::Completed
        ]
    );
}

#[tokio::test]
async fn starvation_then_release_hands_the_gpu_to_the_parked_case() {
    let h = harness(&["only_step"]);
    h.store.register_gpu(0, None).unwrap();
    h.store.register_gpu(1, None).unwrap();

    // Two running cases hold both GPUs.
    h.conductor.start_workflow("h0").await.unwrap();
    h.conductor.start_workflow("h1").await.unwrap();
    drain_plain(&h.broker, EXECUTOR).await;

    // A third case arrives and parks.
    h.publish_event("new_case_found", json!({"case_id": "c3"})).await;
    h.pump_conductor().await;
    assert_eq!(h.store.case_status("c3").unwrap(), Some(CaseStatus::PendingResource));

    // The case holding GPU 1 finishes its last step.
    h.publish_event("execution_succeeded", json!({"case_id": "h1", "stdout": ""})).await;
    h.pump_conductor().await;
    assert_eq!(h.store.case_status("h1").unwrap(), Some(CaseStatus::Completed));
    assert_eq!(h.store.list_gpus().unwrap()[1].status, GpuStatus::Available);

    // A duplicate announcement is a no-op.
    h.publish_event("new_case_found", json!({"case_id": "c3"})).await;
    h.pump_conductor().await;
    assert_eq!(h.store.case_status("c3").unwrap(), Some(CaseStatus::PendingResource));

    // The external driver re-triggers advance; c3 takes GPU 1.
    h.conductor.advance_workflow("c3").await.unwrap();
    let case = h.store.get_case("c3").unwrap().unwrap();
    assert_eq!(case.status, CaseStatus::Processing);
    assert_eq!(case.assigned_gpu_id, Some(1));
}

#[tokio::test]
async fn transient_remote_failures_do_not_duplicate_history() {
    let h = harness(&["stepA", "stepB"]);
    h.store.register_gpu(0, None).unwrap();
    h.publish_event("new_case_found", json!({"case_id": "c1"})).await;
    h.pump_conductor().await;

    // Two transient failures, then success, all within one delivery.
    let shell = FakeShell::new();
    shell.push_exec_failure(1, "transient fault");
    shell.push_exec_failure(1, "transient fault");
    shell.push_success("ok");
    let mut executor = RemoteExecutor::new(Arc::new(shell.clone()), EXECUTOR.into());
    drain_queue_with_worker(&h.broker, &mut executor, fast_retry()).await;

    // Exactly one success event came back.
    let events = drain_plain(&h.broker, crate::support::CONDUCTOR).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].command, "execution_succeeded");
    assert_eq!(events[0].correlation_id.as_str(), "c1");

    h.conductor.process(&events[0]).await.unwrap();
    assert_eq!(h.store.case_workflow_step("c1").unwrap().as_deref(), Some("stepB"));

    // One history row per status change; retries added none.
    let history = h.store.case_history("c1").unwrap();
    assert_eq!(history.len(), 3, "QUEUED, PROCESSING(stepA), PROCESSING(stepB)");
    assert_eq!(shell.commands().len(), 3, "three execution attempts");
}
