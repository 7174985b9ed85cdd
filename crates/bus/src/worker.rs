// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The common shape of every worker: validate → dispatch → publish
//! outcome, with structured retry around transient failures.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, MessageHandler, Outcome};
use crate::envelope::Envelope;
use crate::error::{BusError, HandlerError};

/// Failure classification for worker handlers. The first four kinds are
/// transient and re-attempted by the retry envelope; `Fatal` fails the
/// message immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    Network,
    RemoteExecution,
    DataIntegrity,
    FileNotFound,
    Fatal,
}

gantry_core::simple_display! {
    WorkerErrorKind {
        Network => "network error",
        RemoteExecution => "remote execution error",
        DataIntegrity => "data integrity error",
        FileNotFound => "file not found",
        Fatal => "fatal error",
    }
}

/// A classified worker failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct WorkerError {
    pub kind: WorkerErrorKind,
    pub message: String,
}

impl WorkerError {
    pub fn new(kind: WorkerErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != WorkerErrorKind::Fatal
    }
}

/// A message published back to the conductor queue when a command
/// finishes (or finally fails).
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeMessage {
    pub command: String,
    pub payload: serde_json::Value,
}

impl OutcomeMessage {
    pub fn new(command: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { command: command.into(), payload }
    }
}

/// In-handler retry policy (distinct from the bus-level republish).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// One worker's command handling, plugged into [`run_worker`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name, used as the logging component.
    fn name(&self) -> &'static str;

    /// Queue this worker consumes.
    fn queue(&self) -> &str;

    /// Structural validation: required commands and payload fields.
    /// An `Err` dead-letters the message and reports it as malformed.
    fn validate(&self, envelope: &Envelope) -> Result<(), String>;

    /// Execute one command. `Ok(None)` means handled with nothing to
    /// report (e.g. a monitoring tick).
    async fn execute(&mut self, envelope: &Envelope) -> Result<Option<OutcomeMessage>, WorkerError>;

    /// Outcome published when retries are exhausted. `None` suppresses
    /// the failure report.
    fn failure_outcome(&self, envelope: &Envelope, error: &WorkerError) -> Option<OutcomeMessage>;
}

/// Consume `worker.queue()` until cancelled, wrapping each delivery in
/// the validate / retry / publish-outcome envelope.
pub async fn run_worker<W: Worker>(
    broker: &Broker,
    conductor_queue: &str,
    worker: &mut W,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), BusError> {
    let queue = worker.queue().to_string();
    tracing::info!(worker = worker.name(), queue = queue.as_str(), "worker consuming");
    let mut handler = WorkerHandler {
        broker: broker.clone(),
        conductor_queue: conductor_queue.to_string(),
        worker,
        policy,
    };
    broker.consume(&queue, &mut handler, cancel).await
}

struct WorkerHandler<'a, W: Worker> {
    broker: Broker,
    conductor_queue: String,
    worker: &'a mut W,
    policy: RetryPolicy,
}

impl<W: Worker> WorkerHandler<'_, W> {
    async fn publish_outcome(
        &self,
        outcome: OutcomeMessage,
        correlation_id: gantry_core::CorrelationId,
    ) -> Result<(), BusError> {
        self.broker
            .publish(
                &self.conductor_queue,
                &outcome.command,
                outcome.payload,
                Some(correlation_id),
                0,
            )
            .await
            .map(|_| ())
    }

    async fn report_malformed(&self, envelope: &Envelope, error: &str) {
        let original = serde_json::to_string(envelope).unwrap_or_default();
        let truncated: String = original.chars().take(500).collect();
        let result = self
            .broker
            .publish(
                &self.conductor_queue,
                "malformed_message",
                json!({ "error": error, "original_message": truncated }),
                Some(envelope.correlation_id.clone()),
                0,
            )
            .await;
        if let Err(err) = result {
            tracing::error!(
                worker = self.worker.name(),
                correlation_id = %envelope.correlation_id,
                error = %err,
                "failed to report malformed message"
            );
        }
    }
}

#[async_trait]
impl<W: Worker> MessageHandler for WorkerHandler<'_, W> {
    async fn handle(&mut self, envelope: Envelope) -> Result<Outcome, HandlerError> {
        let correlation_id = envelope.correlation_id.clone();

        if let Err(reason) = self.worker.validate(&envelope) {
            tracing::error!(
                worker = self.worker.name(),
                command = envelope.command.as_str(),
                correlation_id = %correlation_id,
                reason = reason.as_str(),
                "message validation failed"
            );
            self.report_malformed(&envelope, &reason).await;
            return Ok(Outcome::DeadLetter);
        }

        let mut attempt = 0;
        let error = loop {
            match self.worker.execute(&envelope).await {
                Ok(outcome) => {
                    if let Some(outcome) = outcome {
                        self.publish_outcome(outcome, correlation_id.clone())
                            .await
                            .map_err(|e| HandlerError(e.to_string()))?;
                    }
                    return Ok(Outcome::Ack);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        worker = self.worker.name(),
                        command = envelope.command.as_str(),
                        correlation_id = %correlation_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break err,
            }
        };

        tracing::error!(
            worker = self.worker.name(),
            command = envelope.command.as_str(),
            correlation_id = %correlation_id,
            error = %error,
            "command failed after retries"
        );
        if let Some(outcome) = self.worker.failure_outcome(&envelope, &error) {
            self.publish_outcome(outcome, correlation_id)
                .await
                .map_err(|e| HandlerError(e.to_string()))?;
        }
        Ok(Outcome::DeadLetter)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
