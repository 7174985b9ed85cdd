// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the integration scenarios.

use std::collections::BTreeMap;
use std::time::Duration;

use gantry_bus::{run_worker, Broker, Envelope, RetryPolicy, Worker};
use gantry_conductor::{Conductor, WorkflowConfig};
use gantry_storage::StateStore;
use tokio_util::sync::CancellationToken;

pub const CONDUCTOR: &str = "conductor_queue";
pub const EXECUTOR: &str = "remote_executor_queue";

pub struct Harness {
    _dir: tempfile::TempDir,
    pub store: StateStore,
    pub broker: Broker,
    pub conductor: Conductor,
}

/// Store + broker + conductor over temp databases, with one command
/// template per step.
pub fn harness(steps: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&dir.path().join("state.db")).unwrap();
    let broker =
        Broker::new(&dir.path().join("broker.db"), 3).with_malformed_reports(CONDUCTOR);

    let remote_commands: BTreeMap<String, String> = steps
        .iter()
        .map(|step| (step.to_string(), format!("{step} --case {{case_id}} --gpu {{gpu_id}}")))
        .collect();
    let config = WorkflowConfig {
        steps: steps.iter().map(|s| s.to_string()).collect(),
        remote_commands,
        upload_dir: "/data/upload".into(),
        download_dir: "/data/download".into(),
        local_staging_dir: "/staging".into(),
        executor_queue: EXECUTOR.into(),
        transfer_queue: "file_transfer_queue".into(),
    };
    let conductor = Conductor::new(store.clone(), broker.clone(), config);
    Harness { _dir: dir, store, broker, conductor }
}

impl Harness {
    pub async fn publish_event(&self, command: &str, payload: serde_json::Value) {
        self.broker.publish(CONDUCTOR, command, payload, None, 0).await.unwrap();
    }

    /// Feed every queued conductor event through the engine.
    pub async fn pump_conductor(&self) {
        while let Some(envelope) = self.broker.take_next(CONDUCTOR).await.unwrap() {
            self.conductor.process(&envelope).await.unwrap();
        }
    }
}

/// Run a worker's consume loop until its queue is drained, then stop.
pub async fn drain_queue_with_worker<W: Worker>(
    broker: &Broker,
    worker: &mut W,
    policy: RetryPolicy,
) {
    let cancel = CancellationToken::new();
    let queue = worker.queue().to_string();
    let watcher = {
        let broker = broker.clone();
        let cancel = cancel.clone();
        async move {
            loop {
                match broker.queue_depth(&queue).await {
                    Ok(0) => {
                        cancel.cancel();
                        return;
                    }
                    _ => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
        }
    };
    let (result, ()) = tokio::join!(run_worker(broker, CONDUCTOR, worker, policy, &cancel), watcher);
    result.unwrap();
}

/// Pop every message currently in a queue.
pub async fn drain_plain(broker: &Broker, queue: &str) -> Vec<Envelope> {
    let mut messages = Vec::new();
    while let Some(envelope) = broker.take_next(queue).await.unwrap() {
        messages.push(envelope);
    }
    messages
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(1) }
}
