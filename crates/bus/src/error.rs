// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus error kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached after bounded reconnect attempts.
    /// Workers treat this as fatal and exit for the supervisor to restart.
    #[error("message broker unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error raised by a consume handler; triggers the application-level
/// retry republish (or dead-lettering once retries are exhausted).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);
