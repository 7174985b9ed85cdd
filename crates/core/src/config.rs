// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration for the gantry daemon and its workers.
//!
//! One YAML file configures the whole fleet; every process is handed the
//! same path on its command line and loads it independently. Validation
//! happens once at load so a bad file fails the process before any state
//! is touched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub queues: QueueNames,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
    /// Step name → remote command template with `{slot}` substitutions.
    #[serde(default)]
    pub remote_commands: BTreeMap<String, String>,
    #[serde(default)]
    pub conductor: ConductorConfig,
    #[serde(default)]
    pub curator: CuratorConfig,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessConfig>,
    #[serde(default)]
    pub hpc: HpcConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the state-store database file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Path of the durable broker database file.
    pub url: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    pub conductor: String,
    pub remote_executor: String,
    pub file_transfer: String,
    pub system_curator: String,
    pub archiver: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            conductor: "conductor_queue".into(),
            remote_executor: "remote_executor_queue".into(),
            file_transfer: "file_transfer_queue".into(),
            system_curator: "system_curator_queue".into(),
            archiver: "archiver_queue".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Ordered step list of the default QA workflow.
    pub default_qa: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub remote_paths: RemotePaths,
    /// Seconds between the conductor's own `system_monitor` ticks.
    pub monitor_interval_sec: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self { remote_paths: RemotePaths::default(), monitor_interval_sec: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePaths {
    pub upload_dir: String,
    pub download_dir: String,
}

impl Default for RemotePaths {
    fn default() -> Self {
        Self { upload_dir: "/data".into(), download_dir: "/data".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    /// Seconds between `system_monitor` ticks published by the orchestrator.
    pub monitor_interval_sec: u64,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self { monitor_interval_sec: 60 }
    }
}

/// Restart policy and placement of one supervised worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub enabled: bool,
    /// Run on the HPC host over the supervisor's remote shell.
    pub remote: bool,
    /// Command line used for remote workers (`nohup <cmd> … & echo $!`).
    pub remote_command: Option<String>,
    pub restart_delay_sec: u64,
    pub max_restart_delay_sec: u64,
    pub max_restart_attempts: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: false,
            remote_command: None,
            restart_delay_sec: 30,
            max_restart_delay_sec: 900,
            max_restart_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HpcConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub ssh_key_path: Option<PathBuf>,
    pub connect_timeout_sec: u64,
    /// Per-command execution timeout for remote exec.
    pub exec_timeout_sec: u64,
}

impl Default for HpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 22,
            user: String::new(),
            ssh_key_path: None,
            connect_timeout_sec: 30,
            exec_timeout_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Delivery attempts before a message dead-letters.
    pub max_retries: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console log filter (`error`..`trace`).
    pub level: String,
    /// Mirror log lines into the state store's `logs` table.
    pub to_store: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), to_store: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Staging directory watched for new case directories.
    pub target_directory: PathBuf,
    pub scan_interval_sec: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { target_directory: PathBuf::new(), scan_interval_sec: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub max_retries: u32,
    pub retry_delay_sec: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { max_retries: 3, retry_delay_sec: 5 }
    }
}

impl AppConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: AppConfig = serde_yaml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must be set".into()));
        }
        if self.broker.url.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("broker.url must be set".into()));
        }
        for step in &self.workflows.default_qa {
            // Transfer steps route to the file-transfer worker and carry
            // no remote command.
            if step == "upload_case" || step == "download_results" {
                continue;
            }
            if !self.remote_commands.contains_key(step) {
                return Err(ConfigError::Invalid(format!(
                    "workflow step '{step}' has no remote_commands template"
                )));
            }
        }
        if self.hpc.enabled {
            if self.hpc.host.is_empty() {
                return Err(ConfigError::Invalid("hpc.host must be set when hpc.enabled".into()));
            }
            if self.hpc.user.is_empty() {
                return Err(ConfigError::Invalid("hpc.user must be set when hpc.enabled".into()));
            }
        }
        for (name, process) in &self.processes {
            if process.remote && process.remote_command.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "remote process '{name}' has no remote_command"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
