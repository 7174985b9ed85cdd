// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator root: wires the store, broker and supervisor, emits
//! the periodic `system_monitor` tick, and shuts the fleet down on
//! SIGTERM/SIGINT.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};

use gantry_bus::Broker;
use gantry_core::{AppConfig, Clock, SystemClock};
use gantry_remote::{RemoteShell, SshConfig, SshShell};
use gantry_storage::StateStore;

use crate::supervisor::{Supervisor, SupervisorError, WorkerLauncher};

/// Seconds between supervisor health probes.
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Storage(#[from] gantry_storage::StorageError),

    #[error(transparent)]
    Bus(#[from] gantry_bus::BusError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to install signal handler: {0}")]
    Signal(std::io::Error),

    #[error("failed to locate worker binary: {0}")]
    WorkerBinary(std::io::Error),
}

pub struct Orchestrator {
    config: AppConfig,
    // NOTE(lifetime): held so the root's store handle closes on shutdown
    #[allow(dead_code)]
    store: StateStore,
    broker: Broker,
    supervisor: Supervisor,
}

impl Orchestrator {
    /// Wire everything up. Fails fast on an unreachable store; the
    /// broker connects lazily on the first tick.
    pub fn new(config: AppConfig, config_path: &Path) -> Result<Self, OrchestratorError> {
        let store = StateStore::open(&config.database.path)?;
        let broker = Broker::new(&config.broker.url, config.messaging.max_retries);

        let shell: Option<Arc<dyn RemoteShell>> = if config.hpc.enabled {
            let control = control_socket_path(&config.database.path);
            let ssh = SshConfig::from_hpc(&config.hpc).with_control_path(control);
            Some(Arc::new(SshShell::new(ssh)))
        } else {
            None
        };

        let launcher = WorkerLauncher::current_exe(config_path.to_path_buf())
            .map_err(OrchestratorError::WorkerBinary)?;
        let supervisor = Supervisor::new(
            store.clone(),
            Box::new(launcher),
            shell,
            &config.hpc,
            &config.processes,
        );

        Ok(Self { config, store, broker, supervisor })
    }

    /// Start the fleet and block until a shutdown signal arrives.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        tracing::info!("starting gantry system");
        self.supervisor.adopt_persisted().await?;
        self.supervisor.start_all().await?;
        tracing::info!("gantry system started");

        let mut sigterm =
            signal(SignalKind::terminate()).map_err(OrchestratorError::Signal)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(OrchestratorError::Signal)?;

        let monitor_interval = Duration::from_secs(self.config.curator.monitor_interval_sec.max(1));
        let mut monitor_tick = tokio::time::interval(monitor_interval);
        monitor_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut health_tick = tokio::time::interval(HEALTH_PROBE_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first interval tick is not a monitoring cycle.
        monitor_tick.tick().await;
        health_tick.tick().await;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, stopping system");
                    break;
                }
                _ = sigint.recv() => {
                    tracing::info!("received SIGINT, stopping system");
                    break;
                }
                _ = monitor_tick.tick() => {
                    self.publish_monitor_tick().await;
                }
                _ = health_tick.tick() => {
                    if let Err(err) = self.supervisor.check_health().await {
                        tracing::error!(error = %err, "health check failed");
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// The only tick the core generates; everything else is
    /// event-driven.
    async fn publish_monitor_tick(&self) {
        let result = self
            .broker
            .publish(
                &self.config.queues.system_curator,
                "system_monitor",
                serde_json::json!({
                    "triggered_by": "orchestrator",
                    "timestamp": SystemClock.timestamp(),
                }),
                None,
                0,
            )
            .await;
        match result {
            Ok(correlation_id) => {
                tracing::debug!(correlation_id = %correlation_id, "sent system_monitor tick");
            }
            Err(err) => tracing::error!(error = %err, "failed to send system_monitor tick"),
        }
    }

    async fn shutdown(&self) -> Result<(), OrchestratorError> {
        self.supervisor.stop_all().await?;
        tracing::info!("gantry system stopped");
        Ok(())
    }
}

/// Control-master socket for the supervisor's persistent SSH channel,
/// kept next to the state database.
fn control_socket_path(database_path: &Path) -> PathBuf {
    let dir = database_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join("hpc-control.sock")
}
