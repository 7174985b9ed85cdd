// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Case scanner: watches the staging directory and announces new case
//! directories to the conductor.
//!
//! Idempotence lives in the `scanned_cases` table, reloaded every cycle:
//! any recorded path, `processed` or `failed`, is already seen and is
//! not re-announced. A `failed` row (publish failure) therefore stays
//! quiet until an operator clears it.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use gantry_bus::Broker;
use gantry_core::AppConfig;
use gantry_storage::StateStore;

use super::WorkerRunError;

pub struct CaseScanner {
    store: StateStore,
    broker: Broker,
    conductor_queue: String,
    target_directory: PathBuf,
    scan_interval: Duration,
}

impl CaseScanner {
    pub fn new(config: &AppConfig, store: StateStore, broker: Broker) -> Self {
        Self {
            store,
            broker,
            conductor_queue: config.queues.conductor.clone(),
            target_directory: config.scanner.target_directory.clone(),
            scan_interval: Duration::from_secs(config.scanner.scan_interval_sec),
        }
    }

    /// One scan cycle. Returns how many new cases were announced.
    pub async fn scan_once(&self) -> Result<usize, WorkerRunError> {
        let seen = self.store.seen_case_paths()?;
        let entries = match std::fs::read_dir(&self.target_directory) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(
                    directory = %self.target_directory.display(),
                    error = %err,
                    "failed to read staging directory"
                );
                return Ok(0);
            }
        };

        let mut announced = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let case_path = path.display().to_string();
            if seen.contains(&case_path) {
                continue;
            }
            let Some(case_id) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };

            tracing::info!(case_id = case_id.as_str(), case_path = case_path.as_str(), "new case found");
            match self
                .broker
                .publish(&self.conductor_queue, "new_case_found", json!({ "case_id": case_id }), None, 0)
                .await
            {
                Ok(correlation_id) => {
                    self.store.add_scanned_case(&case_path, "processed")?;
                    tracing::info!(
                        case_id = case_id.as_str(),
                        correlation_id = %correlation_id,
                        "announced new case"
                    );
                    announced += 1;
                }
                Err(err) => {
                    tracing::error!(
                        case_id = case_id.as_str(),
                        error = %err,
                        "failed to announce case, recording as failed"
                    );
                    self.store.add_scanned_case(&case_path, "failed")?;
                }
            }
        }
        Ok(announced)
    }

    /// Scan on the configured interval until cancelled.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), WorkerRunError> {
        tracing::info!(
            directory = %self.target_directory.display(),
            interval_sec = self.scan_interval.as_secs(),
            "case scanner starting"
        );
        loop {
            self.scan_once().await?;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.scan_interval) => {}
            }
        }
    }
}

pub async fn run(
    config: &AppConfig,
    store: StateStore,
    broker: Broker,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    CaseScanner::new(config, store, broker).run(cancel).await
}

#[cfg(test)]
#[path = "case_scanner_tests.rs"]
mod tests;
