// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event routing and the start / advance / fail algorithms.

use std::collections::BTreeMap;

use serde_json::json;

use gantry_bus::{Broker, Envelope};
use gantry_core::{AppConfig, CaseStatus};
use gantry_storage::{ReserveError, StateStore, StepChange};

use crate::error::ConductorError;
use crate::template::{render_command, TemplateVars};

/// Step names the conductor routes to the file-transfer queue instead
/// of the remote executor.
const UPLOAD_STEP: &str = "upload_case";
const DOWNLOAD_STEP: &str = "download_results";

/// Workflow wiring extracted from the application config.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Ordered step list.
    pub steps: Vec<String>,
    /// Step name → command template.
    pub remote_commands: BTreeMap<String, String>,
    pub upload_dir: String,
    pub download_dir: String,
    /// Local staging root the scanner watches.
    pub local_staging_dir: String,
    /// Queue the remote executor consumes.
    pub executor_queue: String,
    /// Queue the file-transfer worker consumes.
    pub transfer_queue: String,
}

impl WorkflowConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            steps: config.workflows.default_qa.clone(),
            remote_commands: config.remote_commands.clone(),
            upload_dir: config.conductor.remote_paths.upload_dir.clone(),
            download_dir: config.conductor.remote_paths.download_dir.clone(),
            local_staging_dir: config.scanner.target_directory.display().to_string(),
            executor_queue: config.queues.remote_executor.clone(),
            transfer_queue: config.queues.file_transfer.clone(),
        }
    }
}

/// The workflow engine. One instance per conductor process; all state
/// lives in the store, so concurrent instances coordinate through its
/// transactions.
pub struct Conductor {
    store: StateStore,
    broker: Broker,
    config: WorkflowConfig,
}

impl Conductor {
    pub fn new(store: StateStore, broker: Broker, config: WorkflowConfig) -> Self {
        Self { store, broker, config }
    }

    /// Handle one conductor-queue event, failing the named case when the
    /// handler itself errors (the case must not hang in PROCESSING
    /// because of a conductor-side fault).
    pub async fn process(&self, envelope: &Envelope) -> Result<(), ConductorError> {
        match self.handle_event(envelope).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let Some(case_id) = envelope.case_id() else {
                    return Err(err);
                };
                tracing::error!(
                    command = envelope.command.as_str(),
                    case_id,
                    correlation_id = %envelope.correlation_id,
                    error = %err,
                    "event handling failed, failing workflow"
                );
                self.fail_workflow(case_id, &err.to_string()).await?;
                Ok(())
            }
        }
    }

    /// Route one event to start / advance / fail.
    pub async fn handle_event(&self, envelope: &Envelope) -> Result<(), ConductorError> {
        tracing::info!(
            command = envelope.command.as_str(),
            correlation_id = %envelope.correlation_id,
            "handling event"
        );

        let case_id = match envelope.case_id() {
            Some(case_id) => case_id,
            None => {
                match envelope.command.as_str() {
                    "malformed_message" => {
                        tracing::warn!(
                            correlation_id = %envelope.correlation_id,
                            error = envelope.payload_str("error").unwrap_or("unknown"),
                            "worker reported a malformed message"
                        );
                    }
                    _ => {
                        tracing::warn!(
                            command = envelope.command.as_str(),
                            correlation_id = %envelope.correlation_id,
                            "event without case_id dropped"
                        );
                    }
                }
                return Ok(());
            }
        };

        match envelope.command.as_str() {
            "new_case_found" => self.start_workflow(case_id).await,
            "execution_succeeded"
            | "case_upload_completed"
            | "results_download_completed"
            | "download_completed" => self.advance_workflow(case_id).await,
            "execution_failed" | "file_transfer_failed" => {
                let error = envelope.payload_str("error").unwrap_or("Unknown error");
                self.fail_workflow(case_id, error).await
            }
            other => {
                tracing::warn!(command = other, case_id, "unknown message type dropped");
                Ok(())
            }
        }
    }

    /// Create the case record and kick off its first step. A case that
    /// already exists is left untouched.
    pub async fn start_workflow(&self, case_id: &str) -> Result<(), ConductorError> {
        if self.store.case_exists(case_id)? {
            tracing::info!(case_id, "case already exists, skipping");
            return Ok(());
        }

        tracing::info!(case_id, "starting workflow");
        self.store.update_case_status(
            case_id,
            CaseStatus::Queued,
            Some("New case detected"),
            StepChange::Keep,
        )?;
        self.advance_workflow(case_id).await
    }

    /// Move a case to its next step, completing the workflow when no
    /// steps remain. Without a free GPU the case parks in
    /// `PENDING_RESOURCE` until something re-invokes advance.
    pub async fn advance_workflow(&self, case_id: &str) -> Result<(), ConductorError> {
        if !self.store.case_exists(case_id)? {
            tracing::error!(case_id, "cannot advance workflow: case not found");
            return Ok(());
        }

        let current = self.store.case_workflow_step(case_id)?;
        let Some(next_step) = self.next_step(current.as_deref()) else {
            tracing::info!(case_id, "workflow completed");
            self.store.update_case_status(
                case_id,
                CaseStatus::Completed,
                Some("All workflow steps completed successfully"),
                StepChange::Clear,
            )?;
            self.store.release_gpu_for_case(case_id)?;
            return Ok(());
        };

        match self.store.reserve_gpu_for_case(case_id) {
            Ok(gpu_id) => {
                tracing::info!(case_id, gpu_id, step = next_step.as_str(), "reserved GPU");
                self.store.update_case_status(
                    case_id,
                    CaseStatus::Processing,
                    Some(&format!("Starting workflow step: {next_step}")),
                    StepChange::Set(&next_step),
                )?;
                self.publish_step_command(case_id, &next_step, gpu_id).await
            }
            Err(ReserveError::NoResource) => {
                tracing::info!(case_id, step = next_step.as_str(), "no GPUs available");
                self.store.update_case_status(
                    case_id,
                    CaseStatus::PendingResource,
                    Some("Waiting for available GPU"),
                    StepChange::Keep,
                )?;
                Ok(())
            }
            Err(ReserveError::Storage(err)) => Err(err.into()),
        }
    }

    /// Record the failure and free the case's GPU.
    pub async fn fail_workflow(&self, case_id: &str, error: &str) -> Result<(), ConductorError> {
        tracing::error!(case_id, error, "workflow failed");
        self.store.update_case_status(
            case_id,
            CaseStatus::Failed,
            Some(&format!("Workflow failed: {error}")),
            StepChange::Keep,
        )?;
        self.store.release_gpu_for_case(case_id)?;
        Ok(())
    }

    fn next_step(&self, current: Option<&str>) -> Option<String> {
        let steps = &self.config.steps;
        let Some(current) = current else {
            return steps.first().cloned();
        };
        match steps.iter().position(|step| step == current) {
            Some(index) => steps.get(index + 1).cloned(),
            None => {
                tracing::error!(step = current, "unknown workflow step");
                None
            }
        }
    }

    async fn publish_step_command(
        &self,
        case_id: &str,
        step: &str,
        gpu_id: i64,
    ) -> Result<(), ConductorError> {
        match step {
            UPLOAD_STEP => {
                return self
                    .publish_transfer_command(
                        case_id,
                        UPLOAD_STEP,
                        format!("{}/{case_id}", self.config.local_staging_dir),
                        format!("{}/{case_id}", self.config.upload_dir),
                    )
                    .await;
            }
            DOWNLOAD_STEP => {
                return self
                    .publish_transfer_command(
                        case_id,
                        DOWNLOAD_STEP,
                        format!("{}/{case_id}/output", self.config.local_staging_dir),
                        format!("{}/{case_id}/output", self.config.download_dir),
                    )
                    .await;
            }
            _ => {}
        }

        let template = self
            .config
            .remote_commands
            .get(step)
            .ok_or_else(|| ConductorError::MissingTemplate(step.to_string()))?;
        let vars = TemplateVars::for_case(
            case_id,
            gpu_id,
            &self.config.upload_dir,
            &self.config.download_dir,
        );
        let command = render_command(template, &vars)
            .map_err(|slot| ConductorError::UnknownSlot { step: step.to_string(), slot })?;

        self.broker
            .publish(
                &self.config.executor_queue,
                "execute_command",
                json!({
                    "case_id": case_id,
                    "command": command,
                    "gpu_id": gpu_id,
                    "step": step,
                }),
                Some(case_id.into()),
                0,
            )
            .await?;
        tracing::info!(case_id, step, gpu_id, "published execute_command");
        Ok(())
    }

    async fn publish_transfer_command(
        &self,
        case_id: &str,
        command: &str,
        local_path: String,
        remote_path: String,
    ) -> Result<(), ConductorError> {
        self.broker
            .publish(
                &self.config.transfer_queue,
                command,
                json!({
                    "case_id": case_id,
                    "local_path": local_path,
                    "remote_path": remote_path,
                }),
                Some(case_id.into()),
                0,
            )
            .await?;
        tracing::info!(case_id, command, "published transfer command");
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
