// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local worker spawning.

use std::path::PathBuf;
use std::process::Stdio;

/// Spawns one local worker process and returns its PID.
///
/// A trait so tests can substitute scripted launchers; the real
/// implementation re-invokes the current executable with a `--worker`
/// subcommand.
pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, worker: &str) -> std::io::Result<u32>;
}

/// Launches `gantryd <config> --worker <name>` detached from our stdio,
/// backgrounded through `sh` so the worker reparents to init instead of
/// lingering as an unreaped child of the supervisor. Recovery after a
/// supervisor restart happens through the persisted PID.
pub struct WorkerLauncher {
    program: PathBuf,
    config_path: PathBuf,
}

impl WorkerLauncher {
    /// Launcher using the currently running executable.
    pub fn current_exe(config_path: PathBuf) -> std::io::Result<Self> {
        Ok(Self { program: std::env::current_exe()?, config_path })
    }

    pub fn new(program: PathBuf, config_path: PathBuf) -> Self {
        Self { program, config_path }
    }
}

impl ProcessLauncher for WorkerLauncher {
    fn spawn(&self, worker: &str) -> std::io::Result<u32> {
        let line = format!(
            "'{}' '{}' --worker '{}' > /dev/null 2>&1 & echo $!",
            self.program.display(),
            self.config_path.display(),
            worker,
        );
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(line)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "spawn shell exited with {}",
                output.status
            )));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .map_err(|_| std::io::Error::other("spawn did not print a PID"))
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
