// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds for the remote seams.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    /// Transport-level failure: the command never ran.
    #[error("remote connection failed: {0}")]
    Connect(String),

    /// The command ran and exited non-zero.
    #[error("remote command exited with status {status}: {stderr}")]
    Exec { status: i32, stderr: String },

    #[error("remote command timed out after {0} seconds")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("local path not found: {0}")]
    NotFound(String),

    /// Transport-level failure during the copy.
    #[error("transfer failed: {0}")]
    Network(String),

    /// Post-transfer verification mismatch.
    #[error("integrity check failed for {path}: {detail}")]
    Integrity { path: String, detail: String },
}
