// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenSSH-backed implementations of the remote seams.
//!
//! Commands go through the `ssh` client binary; transfers through `scp`.
//! A persistent session is an OpenSSH control-master socket: the first
//! command opens it, later commands multiplex over it, and a dead master
//! is transparently re-opened on the next call.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::process::Command;

use gantry_core::HpcConfig;

use crate::error::{ShellError, TransferError};
use crate::shell::{ExecOutput, RemoteShell};
use crate::transfer::FileTransfer;

/// OpenSSH exit status for transport-level failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub exec_timeout: Duration,
    /// Control-master socket path; `None` gives transient sessions.
    pub control_path: Option<PathBuf>,
}

impl SshConfig {
    pub fn from_hpc(hpc: &HpcConfig) -> Self {
        Self {
            host: hpc.host.clone(),
            port: hpc.port,
            user: hpc.user.clone(),
            key_path: hpc.ssh_key_path.clone(),
            connect_timeout: Duration::from_secs(hpc.connect_timeout_sec),
            exec_timeout: Duration::from_secs(hpc.exec_timeout_sec),
            control_path: None,
        }
    }

    /// Use a persistent control-master socket at `path`.
    pub fn with_control_path(mut self, path: PathBuf) -> Self {
        self.control_path = Some(path);
        self
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn common_args(&self, command: &mut Command) {
        command.arg("-o").arg("BatchMode=yes");
        command.arg("-o").arg("StrictHostKeyChecking=accept-new");
        command.arg("-o").arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if let Some(control) = &self.control_path {
            command.arg("-o").arg("ControlMaster=auto");
            command.arg("-o").arg(format!("ControlPath={}", control.display()));
            command.arg("-o").arg("ControlPersist=60");
        }
        if let Some(key) = &self.key_path {
            command.arg("-i").arg(key);
        }
    }
}

/// [`RemoteShell`] over the `ssh` client binary.
pub struct SshShell {
    config: SshConfig,
}

impl SshShell {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&self, command: &str) -> Result<ExecOutput, ShellError> {
        let mut ssh = Command::new("ssh");
        self.config.common_args(&mut ssh);
        ssh.arg("-p").arg(self.config.port.to_string());
        ssh.arg(self.config.destination());
        ssh.arg("--").arg(command);
        ssh.stdin(Stdio::null());

        tracing::debug!(host = %self.config.host, command, "remote exec");
        let timeout = self.config.exec_timeout;
        let output = tokio::time::timeout(timeout, ssh.output())
            .await
            .map_err(|_| ShellError::Timeout(timeout.as_secs()))?
            .map_err(|err| ShellError::Connect(err.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let status = output.status.code().unwrap_or(-1);
        match status {
            0 => Ok(ExecOutput { exit_code: 0, stdout, stderr }),
            SSH_TRANSPORT_FAILURE => Err(ShellError::Connect(stderr.trim().to_string())),
            _ => Err(ShellError::Exec { status, stderr: stderr.trim().to_string() }),
        }
    }
}

/// [`FileTransfer`] over `scp`, verified with SHA-256 sums.
pub struct ScpTransfer {
    config: SshConfig,
    shell: SshShell,
}

impl ScpTransfer {
    pub fn new(config: SshConfig) -> Self {
        let shell = SshShell::new(config.clone());
        Self { config, shell }
    }

    async fn run_scp(&self, from: &str, to: &str) -> Result<(), TransferError> {
        let mut scp = Command::new("scp");
        self.config.common_args(&mut scp);
        scp.arg("-P").arg(self.config.port.to_string());
        scp.arg("-r").arg(from).arg(to);
        scp.stdin(Stdio::null());

        let output = scp.output().await.map_err(|err| TransferError::Network(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransferError::Network(stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn local_sha256(path: &Path) -> Result<String, TransferError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| TransferError::NotFound(format!("{}: {err}", path.display())))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn remote_sha256(&self, remote: &str) -> Result<String, TransferError> {
        let output = self
            .shell
            .exec(&format!("sha256sum '{remote}'"))
            .await
            .map_err(|err| TransferError::Network(err.to_string()))?;
        output
            .stdout
            .split_whitespace()
            .next()
            .map(str::to_owned)
            .ok_or_else(|| TransferError::Integrity {
                path: remote.to_string(),
                detail: "empty sha256sum output".into(),
            })
    }

    /// Relative path → size for every file under a local directory.
    fn local_listing(root: &Path) -> Result<Vec<(String, u64)>, TransferError> {
        fn walk(
            root: &Path,
            dir: &Path,
            out: &mut Vec<(String, u64)>,
        ) -> Result<(), std::io::Error> {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    walk(root, &path, out)?;
                } else {
                    let len = entry.metadata()?.len();
                    let rel = path.strip_prefix(root).unwrap_or(&path);
                    out.push((rel.to_string_lossy().into_owned(), len));
                }
            }
            Ok(())
        }
        let mut listing = Vec::new();
        walk(root, root, &mut listing)
            .map_err(|err| TransferError::NotFound(format!("{}: {err}", root.display())))?;
        listing.sort();
        Ok(listing)
    }

    async fn remote_listing(&self, remote: &str) -> Result<Vec<(String, u64)>, TransferError> {
        let output = self
            .shell
            .exec(&format!("cd '{remote}' && find . -type f -printf '%P %s\\n'"))
            .await
            .map_err(|err| TransferError::Network(err.to_string()))?;
        let mut listing = Vec::new();
        for line in output.stdout.lines() {
            let Some((path, size)) = line.rsplit_once(' ') else { continue };
            let size = size.parse().unwrap_or(0);
            listing.push((path.to_string(), size));
        }
        listing.sort();
        Ok(listing)
    }
}

#[async_trait]
impl FileTransfer for ScpTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransferError> {
        if !local.exists() {
            return Err(TransferError::NotFound(local.display().to_string()));
        }
        // Parent directory must exist before scp can land the copy.
        if let Some((parent, _)) = remote.rsplit_once('/') {
            if !parent.is_empty() {
                self.shell
                    .exec(&format!("mkdir -p '{parent}'"))
                    .await
                    .map_err(|err| TransferError::Network(err.to_string()))?;
            }
        }
        self.run_scp(
            &local.display().to_string(),
            &format!("{}:{remote}", self.config.destination()),
        )
        .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransferError> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| TransferError::Network(err.to_string()))?;
        }
        self.run_scp(
            &format!("{}:{remote}", self.config.destination()),
            &local.display().to_string(),
        )
        .await
    }

    async fn verify(&self, local: &Path, remote: &str) -> Result<(), TransferError> {
        if local.is_dir() {
            let local_files = Self::local_listing(local)?;
            let remote_files = self.remote_listing(remote).await?;
            if local_files != remote_files {
                return Err(TransferError::Integrity {
                    path: remote.to_string(),
                    detail: format!(
                        "directory mismatch: {} local files vs {} remote",
                        local_files.len(),
                        remote_files.len()
                    ),
                });
            }
            return Ok(());
        }

        let local_sum = Self::local_sha256(local).await?;
        let remote_sum = self.remote_sha256(remote).await?;
        if local_sum != remote_sum {
            return Err(TransferError::Integrity {
                path: remote.to_string(),
                detail: format!("sha256 mismatch ({local_sum} != {remote_sum})"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
