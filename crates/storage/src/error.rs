// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store's single uniform error kind.

use thiserror::Error;

/// Any store error, after internal retries. Callers never see SQLite
/// details beyond the message; the store never silently drops a write.
#[derive(Debug, Error)]
#[error("storage failure: {0}")]
pub struct StorageError(pub String);

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError(err.to_string())
    }
}
