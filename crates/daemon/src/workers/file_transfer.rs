// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File transfer worker: moves case inputs up and results down, with
//! integrity verification after every copy.

use std::path::Path;
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
use gantry_remote::{FileTransfer, TransferError};

use super::WorkerRunError;

pub struct FileTransferWorker {
    transfer: Arc<dyn FileTransfer>,
    queue: String,
}

impl FileTransferWorker {
    pub fn new(transfer: Arc<dyn FileTransfer>, queue: String) -> Self {
        Self { transfer, queue }
    }
}

fn classify(err: TransferError) -> WorkerError {
    match err {
        TransferError::NotFound(message) => {
            WorkerError::new(WorkerErrorKind::FileNotFound, message)
        }
        TransferError::Network(message) => WorkerError::new(WorkerErrorKind::Network, message),
        TransferError::Integrity { .. } => {
            WorkerError::new(WorkerErrorKind::DataIntegrity, err.to_string())
        }
    }
}

fn operation(command: &str) -> &'static str {
    if command == "upload_case" {
        "upload"
    } else {
        "download"
    }
}

#[async_trait]
impl Worker for FileTransferWorker {
    fn name(&self) -> &'static str {
        "file_transfer"
    }

    fn queue(&self) -> &str {
        &self.queue
    }

    fn validate(&self, envelope: &Envelope) -> Result<(), String> {
        if !matches!(envelope.command.as_str(), "upload_case" | "download_results") {
            return Err(format!("unsupported command type: {}", envelope.command));
        }
        for field in ["case_id", "local_path", "remote_path"] {
            if envelope.payload_str(field).map_or(true, str::is_empty) {
                return Err(format!("missing or invalid '{field}' field in payload"));
            }
        }
        Ok(())
    }

    async fn execute(&mut self, envelope: &Envelope) -> Result<Option<OutcomeMessage>, WorkerError> {
        // Validated above.
        let case_id = envelope.case_id().unwrap_or_default();
        let local_path = envelope.payload_str("local_path").unwrap_or_default();
        let remote_path = envelope.payload_str("remote_path").unwrap_or_default();
        let local = Path::new(local_path);

        match envelope.command.as_str() {
            "upload_case" => {
                tracing::info!(
                    case_id,
                    local_path,
                    remote_path,
                    correlation_id = %envelope.correlation_id,
                    "starting case upload"
                );
                self.transfer.upload(local, remote_path).await.map_err(classify)?;
                self.transfer.verify(local, remote_path).await.map_err(classify)?;
                tracing::info!(case_id, correlation_id = %envelope.correlation_id, "upload verified");
                Ok(Some(OutcomeMessage::new(
                    "case_upload_completed",
                    json!({
                        "case_id": case_id,
                        "local_path": local_path,
                        "remote_path": remote_path,
                    }),
                )))
            }
            _ => {
                tracing::info!(
                    case_id,
                    local_path,
                    remote_path,
                    correlation_id = %envelope.correlation_id,
                    "starting results download"
                );
                self.transfer.download(remote_path, local).await.map_err(classify)?;
                self.transfer.verify(local, remote_path).await.map_err(classify)?;
                tracing::info!(case_id, correlation_id = %envelope.correlation_id, "download verified");
                Ok(Some(OutcomeMessage::new(
                    "results_download_completed",
                    json!({
                        "case_id": case_id,
                        "local_path": local_path,
                        "remote_path": remote_path,
                    }),
                )))
            }
        }
    }

    fn failure_outcome(&self, envelope: &Envelope, error: &WorkerError) -> Option<OutcomeMessage> {
        Some(OutcomeMessage::new(
            "file_transfer_failed",
            json!({
                "case_id": envelope.case_id(),
                "operation": operation(&envelope.command),
                "error": error.to_string(),
            }),
        ))
    }
}

pub async fn run(
    config: &AppConfig,
    broker: Broker,
    transfer: Arc<dyn FileTransfer>,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    let mut worker = FileTransferWorker::new(transfer, config.queues.file_transfer.clone());
    let policy = RetryPolicy {
        max_retries: config.transfer.max_retries,
        base_delay: Duration::from_secs(config.transfer.retry_delay_sec),
    };
    run_worker(&broker, &config.queues.conductor, &mut worker, policy, cancel).await?;
    Ok(())
}

#[cfg(test)]
#[path = "file_transfer_tests.rs"]
mod tests;
