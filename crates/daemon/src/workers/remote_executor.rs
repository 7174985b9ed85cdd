// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote executor worker: runs step commands on the HPC host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use gantry_bus::{
    run_worker, Broker, Envelope, OutcomeMessage, RetryPolicy, Worker, WorkerError,
    WorkerErrorKind,
};
use gantry_core::AppConfig;
use gantry_remote::{RemoteShell, ShellError};

use super::WorkerRunError;

pub struct RemoteExecutor {
    shell: Arc<dyn RemoteShell>,
    queue: String,
}

impl RemoteExecutor {
    pub fn new(shell: Arc<dyn RemoteShell>, queue: String) -> Self {
        Self { shell, queue }
    }
}

fn classify(err: ShellError) -> WorkerError {
    match err {
        ShellError::Connect(message) => WorkerError::new(WorkerErrorKind::Network, message),
        other => WorkerError::new(WorkerErrorKind::RemoteExecution, other.to_string()),
    }
}

#[async_trait]
impl Worker for RemoteExecutor {
    fn name(&self) -> &'static str {
        "remote_executor"
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn validate(&self, envelope: &Envelope) -> Result<(), String> {
        if envelope.command != "execute_command" {
            return Err(format!("unsupported command type: {}", envelope.command));
        }
        if envelope.case_id().map_or(true, str::is_empty) {
            return Err("missing or invalid 'case_id' field in payload".into());
        }
        if envelope.payload_str("command").map_or(true, str::is_empty) {
            return Err("missing or invalid 'command' field in payload".into());
        }
        Ok(())
    }

    async fn execute(&mut self, envelope: &Envelope) -> Result<Option<OutcomeMessage>, WorkerError> {
        // Validated above.
        let case_id = envelope.case_id().unwrap_or_default();
        let command = envelope.payload_str("command").unwrap_or_default();

        tracing::info!(
            case_id,
            command,
            correlation_id = %envelope.correlation_id,
            "executing remote command"
        );
        let output = self.shell.exec(command).await.map_err(classify)?;

        tracing::info!(case_id, correlation_id = %envelope.correlation_id, "execution succeeded");
        Ok(Some(OutcomeMessage::new(
            "execution_succeeded",
            json!({ "case_id": case_id, "stdout": output.stdout }),
        )))
    }

    fn failure_outcome(&self, envelope: &Envelope, error: &WorkerError) -> Option<OutcomeMessage> {
        Some(OutcomeMessage::new(
            "execution_failed",
            json!({
                "case_id": envelope.case_id(),
                "error": error.to_string(),
            }),
        ))
    }
}

pub async fn run(
    config: &AppConfig,
    broker: Broker,
    shell: Arc<dyn RemoteShell>,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    let mut worker = RemoteExecutor::new(shell, config.queues.remote_executor.clone());
    let policy = RetryPolicy {
        max_retries: config.messaging.max_retries,
        base_delay: Duration::from_secs(5),
    };
    run_worker(&broker, &config.queues.conductor, &mut worker, policy, cancel).await?;
    Ok(())
}

#[cfg(test)]
#[path = "remote_executor_tests.rs"]
mod tests;
