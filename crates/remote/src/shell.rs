// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The remote command-execution seam.

use async_trait::async_trait;

use crate::error::ShellError;

/// Captured output of a completed remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A shell session on the remote host.
///
/// `exec` returns `Ok` only for a zero exit status; a non-zero status is
/// [`ShellError::Exec`] so callers propagate with `?`. Implementations
/// own their connection lifecycle: a transport error invalidates the
/// session and the next call re-opens it.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &str) -> Result<ExecOutput, ShellError>;
}
