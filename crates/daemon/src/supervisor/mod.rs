// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process lifecycle: adoption, spawning, health probing,
//! restart with exponential backoff, graceful shutdown.
//!
//! All mutating entry points serialize on one async lock; internal
//! helpers take `&mut ProcessInfo` and never call back into a locking
//! entry point.

mod launcher;

pub use launcher::{ProcessLauncher, WorkerLauncher};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::sync::Mutex;

use gantry_core::{Clock, HpcConfig, ProcessConfig, SystemClock};
use gantry_remote::RemoteShell;
use gantry_storage::StateStore;

/// Exponent cap: the backoff multiplier never exceeds 2^6.
const BACKOFF_EXPONENT_CAP: u32 = 6;
/// Grace period for a local SIGTERM before SIGKILL.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Storage(#[from] gantry_storage::StorageError),

    #[error("unknown process: {0}")]
    UnknownProcess(String),
}

/// One supervised worker process.
struct ProcessInfo {
    name: String,
    config: ProcessConfig,
    pid: Option<u32>,
    restart_count: u32,
    consecutive_failures: u32,
    last_restart: Option<Instant>,
    failed_permanently: bool,
}

impl ProcessInfo {
    fn new(name: String, config: ProcessConfig) -> Self {
        Self {
            name,
            config,
            pid: None,
            restart_count: 0,
            consecutive_failures: 0,
            last_restart: None,
            failed_permanently: false,
        }
    }

    /// Delay before the next restart attempt. The first failure waits
    /// one base delay; each further consecutive failure doubles it, with
    /// the exponent capped so the multiplier never exceeds 2^6.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(BACKOFF_EXPONENT_CAP);
        let delay = self.config.restart_delay_sec.saturating_mul(1u64 << exponent);
        Duration::from_secs(delay.min(self.config.max_restart_delay_sec))
    }

    fn should_restart(&self) -> bool {
        !self.failed_permanently && self.consecutive_failures <= self.config.max_restart_attempts
    }
}

/// Point-in-time view of one supervised process, for status queries and
/// tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub name: String,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub consecutive_failures: u32,
    pub failed_permanently: bool,
}

/// The process supervisor.
pub struct Supervisor<C: Clock = SystemClock> {
    store: StateStore,
    launcher: Box<dyn ProcessLauncher>,
    /// Shared persistent remote-shell channel; `None` disables remote
    /// workers.
    shell: Option<Arc<dyn RemoteShell>>,
    remote_host: String,
    processes: Mutex<BTreeMap<String, ProcessInfo>>,
    clock: C,
}

impl Supervisor<SystemClock> {
    /// Build a supervisor for the enabled processes in `configs`.
    pub fn new(
        store: StateStore,
        launcher: Box<dyn ProcessLauncher>,
        shell: Option<Arc<dyn RemoteShell>>,
        hpc: &HpcConfig,
        configs: &BTreeMap<String, ProcessConfig>,
    ) -> Self {
        Self::with_clock(store, launcher, shell, hpc, configs, SystemClock)
    }
}

impl<C: Clock> Supervisor<C> {
    pub fn with_clock(
        store: StateStore,
        launcher: Box<dyn ProcessLauncher>,
        shell: Option<Arc<dyn RemoteShell>>,
        hpc: &HpcConfig,
        configs: &BTreeMap<String, ProcessConfig>,
        clock: C,
    ) -> Self {
        let mut processes = BTreeMap::new();
        for (name, config) in configs {
            if !config.enabled {
                continue;
            }
            if config.remote && (!hpc.enabled || shell.is_none()) {
                tracing::warn!(process = name.as_str(), "remote process disabled: no HPC shell");
                continue;
            }
            processes.insert(name.clone(), ProcessInfo::new(name.clone(), config.clone()));
        }
        Self {
            store,
            launcher,
            shell,
            remote_host: hpc.host.clone(),
            processes: Mutex::new(processes),
            clock,
        }
    }

    /// Adopt persisted PIDs: a worker recorded on the expected host is
    /// presumed running and will only be probed, not respawned.
    pub async fn adopt_persisted(&self) -> Result<(), SupervisorError> {
        let rows = self.store.load_process_statuses()?;
        let mut processes = self.processes.lock().await;
        for row in rows {
            let Some(info) = processes.get_mut(&row.process_name) else { continue };
            let expected_host = if info.config.remote { self.remote_host.as_str() } else { "localhost" };
            if row.is_remote == info.config.remote && row.host == expected_host {
                tracing::info!(
                    process = info.name.as_str(),
                    pid = row.pid,
                    "adopted persisted PID"
                );
                info.pid = Some(row.pid);
            }
        }
        Ok(())
    }

    /// Start every enabled worker that is not already running.
    pub async fn start_all(&self) -> Result<(), SupervisorError> {
        let mut processes = self.processes.lock().await;
        tracing::info!(count = processes.len(), "starting worker processes");
        for info in processes.values_mut() {
            if let Some(pid) = info.pid {
                if self.probe(info.config.remote, pid).await {
                    tracing::info!(process = info.name.as_str(), pid, "already running");
                    continue;
                }
                info.pid = None;
            }
            self.start_process(info).await?;
            info.last_restart = Some(self.clock.now());
        }
        Ok(())
    }

    /// Stop every running worker. Idempotent.
    pub async fn stop_all(&self) -> Result<(), SupervisorError> {
        let mut processes = self.processes.lock().await;
        tracing::info!("stopping worker processes");
        for info in processes.values_mut() {
            self.stop_process(info).await?;
        }
        Ok(())
    }

    /// Stop (if needed) and start one worker by name.
    pub async fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        let mut processes = self.processes.lock().await;
        let info = processes
            .get_mut(name)
            .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;
        tracing::info!(process = name, "restarting");
        self.stop_process(info).await?;
        self.start_process(info).await?;
        info.restart_count += 1;
        info.last_restart = Some(self.clock.now());
        Ok(())
    }

    /// Probe every worker and restart failed ones under the backoff
    /// policy. Call periodically.
    pub async fn check_health(&self) -> Result<(), SupervisorError> {
        let mut processes = self.processes.lock().await;
        for info in processes.values_mut() {
            if info.failed_permanently {
                continue;
            }

            if let Some(pid) = info.pid {
                if self.probe(info.config.remote, pid).await {
                    if info.consecutive_failures > 0 {
                        tracing::info!(
                            process = info.name.as_str(),
                            "running again, resetting failure count"
                        );
                        info.consecutive_failures = 0;
                    }
                    continue;
                }
                info.pid = None;
                info.consecutive_failures += 1;
                tracing::warn!(
                    process = info.name.as_str(),
                    pid,
                    failures = info.consecutive_failures,
                    "worker is no longer running"
                );
            }

            // pid is None: dead and awaiting restart, or stopped on
            // purpose (no failures recorded).
            if info.consecutive_failures == 0 {
                continue;
            }
            if !info.should_restart() {
                info.failed_permanently = true;
                tracing::error!(
                    process = info.name.as_str(),
                    restarts = info.restart_count,
                    "exceeded restart attempts, marking permanently failed"
                );
                continue;
            }

            let delay = info.backoff_delay();
            let elapsed = info.last_restart.map(|t| self.clock.now().duration_since(t));
            let due = elapsed.map_or(true, |e| e >= delay);
            if due {
                tracing::info!(
                    process = info.name.as_str(),
                    restart_count = info.restart_count + 1,
                    delay_sec = delay.as_secs(),
                    "restarting failed worker"
                );
                self.start_process(info).await?;
                info.restart_count += 1;
                info.last_restart = Some(self.clock.now());
            } else {
                tracing::debug!(
                    process = info.name.as_str(),
                    delay_sec = delay.as_secs(),
                    "restart delayed by backoff"
                );
            }
        }
        Ok(())
    }

    /// Current view of all supervised processes.
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let processes = self.processes.lock().await;
        processes
            .values()
            .map(|info| ProcessSnapshot {
                name: info.name.clone(),
                pid: info.pid,
                restart_count: info.restart_count,
                consecutive_failures: info.consecutive_failures,
                failed_permanently: info.failed_permanently,
            })
            .collect()
    }

    /// Liveness probe: local PIDs via `kill(pid, 0)`, remote PIDs via
    /// `kill -0` over the shared shell channel.
    async fn probe(&self, remote: bool, pid: u32) -> bool {
        if remote {
            let Some(shell) = &self.shell else { return false };
            shell.exec(&format!("kill -0 {pid}")).await.is_ok()
        } else {
            kill(Pid::from_raw(pid as i32), None).is_ok()
        }
    }

    async fn start_process(&self, info: &mut ProcessInfo) -> Result<(), SupervisorError> {
        if info.config.remote {
            self.start_remote(info).await
        } else {
            self.start_local(info).await
        }
    }

    async fn start_local(&self, info: &mut ProcessInfo) -> Result<(), SupervisorError> {
        match self.launcher.spawn(&info.name) {
            Ok(pid) => {
                info.pid = Some(pid);
                self.store.upsert_process_status(&info.name, pid, false, "localhost")?;
                tracing::info!(process = info.name.as_str(), pid, "started local worker");
            }
            Err(err) => {
                info.pid = None;
                tracing::error!(
                    process = info.name.as_str(),
                    error = %err,
                    "failed to start local worker"
                );
            }
        }
        Ok(())
    }

    async fn start_remote(&self, info: &mut ProcessInfo) -> Result<(), SupervisorError> {
        let Some(shell) = &self.shell else { return Ok(()) };
        let Some(remote_command) = &info.config.remote_command else { return Ok(()) };

        let launch = format!("nohup {remote_command} > /dev/null 2>&1 & echo $!");
        match shell.exec(&launch).await {
            Ok(output) => match output.stdout.trim().parse::<u32>() {
                Ok(pid) => {
                    info.pid = Some(pid);
                    self.store.upsert_process_status(&info.name, pid, true, &self.remote_host)?;
                    tracing::info!(process = info.name.as_str(), pid, "started remote worker");
                }
                Err(_) => {
                    info.pid = None;
                    tracing::error!(
                        process = info.name.as_str(),
                        stdout = output.stdout.trim(),
                        "remote start did not print a PID"
                    );
                }
            },
            Err(err) => {
                info.pid = None;
                tracing::error!(
                    process = info.name.as_str(),
                    error = %err,
                    "failed to start remote worker"
                );
            }
        }
        Ok(())
    }

    async fn stop_process(&self, info: &mut ProcessInfo) -> Result<(), SupervisorError> {
        let Some(pid) = info.pid else { return Ok(()) };
        if info.config.remote {
            self.stop_remote(&info.name, pid).await;
        } else {
            self.stop_local(&info.name, pid).await;
        }
        self.store.clear_process_status(&info.name)?;
        info.pid = None;
        Ok(())
    }

    async fn stop_local(&self, name: &str, pid: u32) {
        let target = Pid::from_raw(pid as i32);
        tracing::info!(process = name, pid, "stopping local worker");
        if kill(target, Signal::SIGTERM).is_err() {
            return; // already gone
        }
        let deadline = Instant::now() + STOP_TIMEOUT;
        while Instant::now() < deadline {
            if kill(target, None).is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tracing::warn!(process = name, pid, "did not terminate, killing");
        let _ = kill(target, Signal::SIGKILL);
    }

    async fn stop_remote(&self, name: &str, pid: u32) {
        let Some(shell) = &self.shell else { return };
        tracing::info!(process = name, pid, "stopping remote worker");
        if shell.exec(&format!("kill {pid}")).await.is_err() {
            return;
        }
        tokio::time::sleep(STOP_TIMEOUT / 2).await;
        if shell.exec(&format!("kill -0 {pid}")).await.is_ok() {
            tracing::warn!(process = name, pid, "did not terminate, killing");
            let _ = shell.exec(&format!("kill -9 {pid}")).await;
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
