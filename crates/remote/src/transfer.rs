// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The file-transfer seam.

use async_trait::async_trait;
use std::path::Path;

use crate::error::TransferError;

/// Moves case directories and result files between the staging area and
/// the remote host, and verifies what it moved.
///
/// Local endpoints are paths; remote endpoints are path strings on the
/// remote side. `verify` is called after every transfer and must compare
/// content, not just existence.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransferError>;
    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransferError>;
    async fn verify(&self, local: &Path, remote: &str) -> Result<(), TransferError>;
}
