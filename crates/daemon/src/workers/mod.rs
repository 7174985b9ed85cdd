// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker mains, one per supervised process.
//!
//! The supervisor launches each of these as
//! `gantryd <config> --worker <name>`; the name doubles as the
//! `processes.<name>` configuration key.

pub mod case_scanner;
pub mod conductor;
pub mod file_transfer;
pub mod remote_executor;
pub mod system_curator;
pub mod telemetry;

use std::sync::Arc;

use clap::ValueEnum;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use gantry_bus::Broker;
use gantry_core::AppConfig;
use gantry_remote::{ScpTransfer, SshConfig, SshShell};
use gantry_storage::StateStore;

/// The workers gantryd knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WorkerKind {
    #[value(name = "conductor")]
    Conductor,
    #[value(name = "remote_executor")]
    RemoteExecutor,
    #[value(name = "file_transfer")]
    FileTransfer,
    #[value(name = "system_curator")]
    SystemCurator,
    #[value(name = "case_scanner")]
    CaseScanner,
}

gantry_core::simple_display! {
    WorkerKind {
        Conductor => "conductor",
        RemoteExecutor => "remote_executor",
        FileTransfer => "file_transfer",
        SystemCurator => "system_curator",
        CaseScanner => "case_scanner",
    }
}

#[derive(Debug, Error)]
pub enum WorkerRunError {
    #[error("worker '{worker}' requires {what}")]
    Disabled { worker: &'static str, what: &'static str },

    #[error(transparent)]
    Storage(#[from] gantry_storage::StorageError),

    #[error(transparent)]
    Bus(#[from] gantry_bus::BusError),
}

/// Run one worker until the token is cancelled.
pub async fn run(
    kind: WorkerKind,
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(), WorkerRunError> {
    let store = StateStore::open(&config.database.path)?;
    let broker = Broker::new(&config.broker.url, config.messaging.max_retries)
        .with_malformed_reports(&config.queues.conductor);
    tracing::info!(worker = %kind, "worker starting");

    match kind {
        WorkerKind::Conductor => conductor::run(config, store, broker, cancel).await,
        WorkerKind::RemoteExecutor => {
            let shell = Arc::new(SshShell::new(hpc_ssh_config(config, "remote_executor")?));
            remote_executor::run(config, broker, shell, cancel).await
        }
        WorkerKind::FileTransfer => {
            let transfer = Arc::new(ScpTransfer::new(hpc_ssh_config(config, "file_transfer")?));
            file_transfer::run(config, broker, transfer, cancel).await
        }
        WorkerKind::SystemCurator => {
            let shell = Arc::new(SshShell::new(hpc_ssh_config(config, "system_curator")?));
            system_curator::run(config, store, broker, shell, cancel).await
        }
        WorkerKind::CaseScanner => case_scanner::run(config, store, broker, cancel).await,
    }
}

fn hpc_ssh_config(config: &AppConfig, worker: &'static str) -> Result<SshConfig, WorkerRunError> {
    if !config.hpc.enabled {
        return Err(WorkerRunError::Disabled { worker, what: "hpc_config.enabled" });
    }
    Ok(SshConfig::from_hpc(&config.hpc))
}
