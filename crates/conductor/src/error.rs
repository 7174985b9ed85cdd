// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error(transparent)]
    Storage(#[from] gantry_storage::StorageError),

    #[error(transparent)]
    Bus(#[from] gantry_bus::BusError),

    #[error("no command template configured for step '{0}'")]
    MissingTemplate(String),

    #[error("command template for step '{step}' references unknown slot '{{{slot}}}'")]
    UnknownSlot { step: String, slot: String },
}
