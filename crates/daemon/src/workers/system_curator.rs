// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System curator worker: refreshes GPU telemetry on each
//! `system_monitor` tick from the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use gantry_bus::{
    run_worker, Broker, Envelope, OutcomeMessage, RetryPolicy, Worker, WorkerError,
    WorkerErrorKind,
};
use gantry_core::AppConfig;
use gantry_remote::{RemoteShell, ShellError};
use gantry_storage::StateStore;

use super::telemetry;
use super::WorkerRunError;

pub struct SystemCurator {
    shell: Arc<dyn RemoteShell>,
    store: StateStore,
    queue: String,
}

impl SystemCurator {
    pub fn new(shell: Arc<dyn RemoteShell>, store: StateStore, queue: String) -> Self {
        Self { shell, store, queue }
    }
}

#[async_trait]
impl Worker for SystemCurator {
    fn name(&self) -> &'static str {
        "system_curator"
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn validate(&self, envelope: &Envelope) -> Result<(), String> {
        if envelope.command != "system_monitor" {
            return Err(format!("unsupported command type: {}", envelope.command));
        }
        Ok(())
    }

    async fn execute(&mut self, envelope: &Envelope) -> Result<Option<OutcomeMessage>, WorkerError> {
        let output = self.shell.exec(telemetry::NVIDIA_SMI_QUERY).await.map_err(|err| match err {
            ShellError::Connect(message) => WorkerError::new(WorkerErrorKind::Network, message),
            other => WorkerError::new(WorkerErrorKind::RemoteExecution, other.to_string()),
        })?;

        let samples = telemetry::parse_nvidia_smi_csv(&output.stdout);
        self.store
            .update_gpu_samples(&samples)
            .map_err(|err| WorkerError::new(WorkerErrorKind::Fatal, err.to_string()))?;

        tracing::info!(
            gpus = samples.len(),
            correlation_id = %envelope.correlation_id,
            "monitor cycle completed"
        );
        Ok(None)
    }

    fn failure_outcome(&self, _envelope: &Envelope, _error: &WorkerError) -> Option<OutcomeMessage> {
        // Monitoring is fire-and-forget; the next tick tries again.
        None
    }
}

pub async fn run(
    config: &AppConfig,
    store: StateStore,
    broker: Broker,
    shell: Arc<dyn RemoteShell>,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    let mut worker = SystemCurator::new(shell, store, config.queues.system_curator.clone());
    let policy = RetryPolicy {
        max_retries: config.messaging.max_retries,
        base_delay: Duration::from_secs(5),
    };
    run_worker(&broker, &config.queues.conductor, &mut worker, policy, cancel).await?;
    Ok(())
}

#[cfg(test)]
#[path = "system_curator_tests.rs"]
mod tests;
