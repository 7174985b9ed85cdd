// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fakes for the remote seams.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ShellError, TransferError};
use crate::shell::{ExecOutput, RemoteShell};
use crate::transfer::FileTransfer;

/// A [`RemoteShell`] that replays scripted responses and records every
/// command it was asked to run. With no scripted response, commands
/// succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeShell {
    inner: Arc<FakeShellInner>,
}

#[derive(Default)]
struct FakeShellInner {
    responses: Mutex<VecDeque<Result<ExecOutput, ShellErrorScript>>>,
    commands: Mutex<Vec<String>>,
}

// ShellError is not Clone; keep a cloneable script form.
enum ShellErrorScript {
    Connect(String),
    Exec { status: i32, stderr: String },
    Timeout(u64),
}

impl ShellErrorScript {
    fn to_error(&self) -> ShellError {
        match self {
            Self::Connect(msg) => ShellError::Connect(msg.clone()),
            Self::Exec { status, stderr } => {
                ShellError::Exec { status: *status, stderr: stderr.clone() }
            }
            Self::Timeout(secs) => ShellError::Timeout(*secs),
        }
    }
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response with the given stdout.
    pub fn push_success(&self, stdout: &str) {
        self.inner.responses.lock().push_back(Ok(ExecOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
    }

    /// Queue a non-zero exit.
    pub fn push_exec_failure(&self, status: i32, stderr: &str) {
        self.inner
            .responses
            .lock()
            .push_back(Err(ShellErrorScript::Exec { status, stderr: stderr.to_string() }));
    }

    /// Queue a transport failure.
    pub fn push_connect_failure(&self, message: &str) {
        self.inner.responses.lock().push_back(Err(ShellErrorScript::Connect(message.to_string())));
    }

    /// Queue a timeout.
    pub fn push_timeout(&self, secs: u64) {
        self.inner.responses.lock().push_back(Err(ShellErrorScript::Timeout(secs)));
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner.commands.lock().clone()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(&self, command: &str) -> Result<ExecOutput, ShellError> {
        self.inner.commands.lock().push(command.to_string());
        match self.inner.responses.lock().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(script)) => Err(script.to_error()),
            None => Ok(ExecOutput { exit_code: 0, stdout: String::new(), stderr: String::new() }),
        }
    }
}

/// Recorded operation on a [`FakeTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOp {
    Upload { local: String, remote: String },
    Download { remote: String, local: String },
    Verify { local: String, remote: String },
}

/// A [`FileTransfer`] that records operations and fails a scripted
/// number of times before succeeding.
#[derive(Clone, Default)]
pub struct FakeTransfer {
    inner: Arc<FakeTransferInner>,
}

#[derive(Default)]
struct FakeTransferInner {
    ops: Mutex<Vec<TransferOp>>,
    failures: Mutex<VecDeque<TransferFailure>>,
}

enum TransferFailure {
    Network(String),
    Integrity(String),
    NotFound(String),
}

impl TransferFailure {
    fn to_error(&self) -> TransferError {
        match self {
            Self::Network(msg) => TransferError::Network(msg.clone()),
            Self::Integrity(msg) => {
                TransferError::Integrity { path: "fake".into(), detail: msg.clone() }
            }
            Self::NotFound(msg) => TransferError::NotFound(msg.clone()),
        }
    }
}

impl FakeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_network(&self, message: &str) {
        self.inner.failures.lock().push_back(TransferFailure::Network(message.to_string()));
    }

    pub fn fail_next_integrity(&self, detail: &str) {
        self.inner.failures.lock().push_back(TransferFailure::Integrity(detail.to_string()));
    }

    pub fn fail_next_not_found(&self, path: &str) {
        self.inner.failures.lock().push_back(TransferFailure::NotFound(path.to_string()));
    }

    pub fn ops(&self) -> Vec<TransferOp> {
        self.inner.ops.lock().clone()
    }

    fn next_failure(&self) -> Option<TransferError> {
        self.inner.failures.lock().pop_front().map(|f| f.to_error())
    }
}

#[async_trait]
impl FileTransfer for FakeTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransferError> {
        self.inner.ops.lock().push(TransferOp::Upload {
            local: local.display().to_string(),
            remote: remote.to_string(),
        });
        self.next_failure().map_or(Ok(()), Err)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransferError> {
        self.inner.ops.lock().push(TransferOp::Download {
            remote: remote.to_string(),
            local: local.display().to_string(),
        });
        self.next_failure().map_or(Ok(()), Err)
    }

    async fn verify(&self, local: &Path, remote: &str) -> Result<(), TransferError> {
        self.inner.ops.lock().push(TransferOp::Verify {
            local: local.display().to_string(),
            remote: remote.to_string(),
        });
        self.next_failure().map_or(Ok(()), Err)
    }
}
